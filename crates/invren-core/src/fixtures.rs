//! In-process PDF builders for tests.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};

/// Build a PDF with one page per entry, each line drawn in Helvetica.
pub(crate) fn text_pdf(pages: &[&[&str]]) -> Vec<u8> {
    build(pages, None)
}

/// Like [`text_pdf`], with the font declaring `/Encoding /StandardEncoding`.
pub(crate) fn standard_encoding_pdf(pages: &[&[&str]]) -> Vec<u8> {
    build(pages, Some("StandardEncoding"))
}

fn build(pages: &[&[&str]], encoding: Option<&str>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut font = Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]);
    if let Some(encoding) = encoding {
        font.set("Encoding", Object::Name(encoding.as_bytes().to_vec()));
    }
    let font_id = doc.add_object(font);
    let resources_id = doc.add_object(Dictionary::from_iter([(
        "Font",
        Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
    )]));

    let mut kids = Vec::new();
    for lines in pages {
        // One text object per line so every extractor sees a line break.
        let mut operations = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            let y = 720 - 16 * i as i64;
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), y.into()]),
                Operation::new("Tj", vec![Object::string_literal(*line)]),
                Operation::new("ET", vec![]),
            ]);
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
        ]));
        kids.push(Object::Reference(page_id));
    }

    // Resources and MediaBox live on the page tree node and are inherited.
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
            ("Resources", Object::Reference(resources_id)),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            ),
        ])),
    );

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut output = Vec::new();
    doc.save_to(&mut output).unwrap();
    output
}

/// Build a PDF whose page tree has no pages.
pub(crate) fn empty_pdf() -> Vec<u8> {
    text_pdf(&[])
}

/// Build an invoice page carrying the three labelled fields.
pub(crate) fn invoice_pdf(agent: &str, invoice: &str, last_name: &str) -> Vec<u8> {
    let agent = format!("SALES PERSON: {}", agent);
    let invoice = format!("INVOICE NO. ITIN{}", invoice);
    let customer = format!("FOR: {}/JOHN MR", last_name);
    text_pdf(&[&[
        "ACME TRAVEL",
        agent.as_str(),
        invoice.as_str(),
        customer.as_str(),
    ]])
}

/// Write `bytes` to `dir/name` and return the path.
pub(crate) fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
