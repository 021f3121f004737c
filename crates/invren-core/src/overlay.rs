//! Overlay stamping and appendix page insertion using lopdf.
//!
//! The first page of the overlay document is turned into a Form XObject and
//! drawn on top of every page of the target, scaled to fit the target page
//! while keeping its aspect ratio. The first page of the last-page document is
//! then appended. The stamped document is written next to the target as
//! `<stem>_temp.pdf` and renamed over it, so the target is either fully
//! replaced or left untouched.

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::OverlayError;

/// Result type for overlay operations.
pub type Result<T> = std::result::Result<T, OverlayError>;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// US Letter, used when a page carries no usable MediaBox.
const DEFAULT_PAGE_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Guard against cyclic Parent chains.
const MAX_TREE_DEPTH: usize = 32;

/// The pair of documents stamped onto every processed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// PDF whose first page is drawn over every target page.
    pub overlay_path: PathBuf,
    /// PDF whose first page is appended after the last target page.
    pub last_page_path: PathBuf,
}

impl OverlayConfig {
    pub fn new(overlay_path: impl Into<PathBuf>, last_page_path: impl Into<PathBuf>) -> Self {
        Self {
            overlay_path: overlay_path.into(),
            last_page_path: last_page_path.into(),
        }
    }

    /// Build a config only when both paths are given.
    pub fn from_parts(overlay_path: Option<PathBuf>, last_page_path: Option<PathBuf>) -> Option<Self> {
        match (overlay_path, last_page_path) {
            (Some(overlay), Some(last_page)) => Some(Self::new(overlay, last_page)),
            _ => None,
        }
    }
}

/// Applies one [`OverlayConfig`] to any number of target files.
#[derive(Debug, Clone)]
pub struct OverlayCompositor {
    config: OverlayConfig,
}

impl OverlayCompositor {
    pub fn new(config: OverlayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Stamp `target` in place.
    pub fn apply(&self, target: &Path) -> Result<()> {
        apply_overlay(target, &self.config.overlay_path, &self.config.last_page_path)
    }
}

/// Path of the scratch file used while stamping `target`.
pub fn temp_path_for(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!("{}_temp.pdf", stem))
}

/// Stamp page 0 of `overlay` onto every page of `target`, append page 0 of
/// `last_page`, and replace `target` with the result.
///
/// `overlay` and `last_page` are only read. On error `target` is unchanged and
/// the scratch file has been removed.
pub fn apply_overlay(target: &Path, overlay: &Path, last_page: &Path) -> Result<()> {
    let temp = temp_path_for(target);

    let result = write_stamped(target, overlay, last_page, &temp).and_then(|()| {
        fs::rename(&temp, target).map_err(|source| OverlayError::Replace {
            path: target.to_path_buf(),
            source,
        })
    });

    if result.is_err() && temp.exists() {
        if let Err(e) = fs::remove_file(&temp) {
            warn!("Failed to remove {}: {}", temp.display(), e);
        }
    }

    result
}

fn write_stamped(target: &Path, overlay: &Path, last_page: &Path, temp: &Path) -> Result<()> {
    let mut doc = load(target)?;
    let stamp = load(overlay)?;
    let appendix = load(last_page)?;

    let target_pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for (path, empty) in [
        (target, target_pages.is_empty()),
        (overlay, stamp.get_pages().is_empty()),
        (last_page, appendix.get_pages().is_empty()),
    ] {
        if empty {
            return Err(OverlayError::EmptyDocument {
                path: path.to_path_buf(),
            });
        }
    }

    let (form_id, form_box) = import_first_page_as_form(&mut doc, stamp)?;
    for &page_id in &target_pages {
        stamp_page(&mut doc, page_id, form_id, form_box)?;
    }
    append_first_page(&mut doc, appendix)?;

    let pruned = doc.prune_objects();
    debug!(
        "Stamped {} pages, appended 1, pruned {} objects",
        target_pages.len(),
        pruned.len()
    );

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| OverlayError::Malformed(format!("cannot serialize: {}", e)))?;
    fs::write(temp, bytes).map_err(|source| OverlayError::Save {
        path: temp.to_path_buf(),
        source,
    })
}

fn load(path: &Path) -> Result<Document> {
    let load_err = |reason: String| OverlayError::Load {
        path: path.to_path_buf(),
        reason,
    };

    let mut doc = Document::load(path).map_err(|e| load_err(e.to_string()))?;
    if doc.is_encrypted() {
        doc.decrypt("")
            .map_err(|_| load_err("document is encrypted".to_string()))?;
    }
    Ok(doc)
}

/// Move every object of `other` into `doc`, except page-tree nodes.
///
/// `other` must already be renumbered past `doc.max_id`.
fn merge_objects(doc: &mut Document, other: Document) {
    let other_max = other.max_id;
    for (id, object) in other.objects {
        let tree_node = matches!(object.type_name(), Ok(b"Catalog" | b"Pages" | b"Page"));
        if !tree_node {
            doc.objects.insert(id, object);
        }
    }
    doc.max_id = doc.max_id.max(other_max);
}

fn import_first_page_as_form(doc: &mut Document, mut stamp: Document) -> Result<(ObjectId, [f32; 4])> {
    stamp.renumber_objects_with(doc.max_id + 1);

    let page_id = first_page(&stamp)?;
    let content = stamp.get_page_content(page_id)?;
    let bbox = page_box(&stamp, page_id);
    let resources = inherited(&stamp, page_id, b"Resources")
        .unwrap_or_else(|| Object::Dictionary(Dictionary::new()));

    merge_objects(doc, stamp);

    let form = Stream::new(
        Dictionary::from_iter([
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Form".to_vec())),
            ("BBox", Object::Array(bbox.iter().map(|&v| Object::Real(v)).collect())),
            ("Resources", resources),
        ]),
        content,
    );
    let form_id = doc.add_object(form);
    trace!("Overlay form XObject {:?} with bbox {:?}", form_id, bbox);

    Ok((form_id, bbox))
}

fn stamp_page(doc: &mut Document, page_id: ObjectId, form_id: ObjectId, form_box: [f32; 4]) -> Result<()> {
    let mut resources = match inherited(doc, page_id, b"Resources") {
        Some(obj) => resolve_dict(doc, &obj)?,
        None => Dictionary::new(),
    };
    let mut xobjects = match resources.get(b"XObject") {
        Ok(obj) => resolve_dict(doc, obj)?,
        Err(_) => Dictionary::new(),
    };
    let name = unused_name(&xobjects);
    xobjects.set(name.as_bytes(), Object::Reference(form_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let matrix = fit_matrix(form_box, page_box(doc, page_id));
    let overlay_ops = Content {
        operations: vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new("cm", matrix.iter().map(|&v| Object::Real(v)).collect()),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ],
    };
    let overlay_bytes = overlay_ops.encode()?;

    let existing = existing_contents(doc, page_id)?;
    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let close_id = doc.add_object(Stream::new(Dictionary::new(), overlay_bytes));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(close_id));

    let page = doc.get_dictionary_mut(page_id)?;
    page.set("Contents", Object::Array(contents));
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// The page's content streams as a flat list of references.
fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let page = doc.get_dictionary(page_id)?;
    Ok(match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(arr)) => arr.clone(),
        _ => Vec::new(),
    })
}

fn append_first_page(doc: &mut Document, mut appendix: Document) -> Result<()> {
    appendix.renumber_objects_with(doc.max_id + 1);

    let page_id = first_page(&appendix)?;
    let mut page = appendix.get_dictionary(page_id)?.clone();
    for key in INHERITABLE {
        if !page.has(key) {
            if let Some(value) = inherited(&appendix, page_id, key) {
                page.set(key, value);
            }
        }
    }

    let root_pages = root_pages_id(doc)?;
    page.set("Parent", Object::Reference(root_pages));

    merge_objects(doc, appendix);
    doc.objects.insert(page_id, Object::Dictionary(page));

    let pages = doc.get_dictionary_mut(root_pages)?;
    let count = pages.get(b"Count").and_then(|c| c.as_i64()).unwrap_or(0);
    pages.get_mut(b"Kids")?.as_array_mut()?.push(Object::Reference(page_id));
    pages.set("Count", count + 1);
    Ok(())
}

fn first_page(doc: &Document) -> Result<ObjectId> {
    doc.get_pages()
        .into_values()
        .next()
        .ok_or_else(|| OverlayError::Malformed("document has no pages".to_string()))
}

fn root_pages_id(doc: &Document) -> Result<ObjectId> {
    let root = doc.trailer.get(b"Root")?.as_reference()?;
    Ok(doc.get_dictionary(root)?.get(b"Pages")?.as_reference()?)
}

/// Look up `key` on the page, walking up Parent links when it is inherited.
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node_id = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(node_id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        node_id = node.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

fn resolve_dict(doc: &Document, obj: &Object) -> Result<Dictionary> {
    match doc.dereference(obj)? {
        (_, Object::Dictionary(dict)) => Ok(dict.clone()),
        (id, _) => Err(OverlayError::Malformed(format!(
            "expected dictionary at {:?}",
            id
        ))),
    }
}

fn unused_name(xobjects: &Dictionary) -> String {
    (0..)
        .map(|n| format!("InvrenStamp{}", n))
        .find(|name| !xobjects.has(name.as_bytes()))
        .unwrap_or_else(|| "InvrenStamp".to_string())
}

/// Visible rectangle of a page: CropBox if present, else MediaBox.
fn page_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    [b"CropBox".as_slice(), b"MediaBox".as_slice()]
        .into_iter()
        .filter_map(|key| inherited(doc, page_id, key))
        .find_map(|obj| rect(doc, &obj))
        .unwrap_or(DEFAULT_PAGE_BOX)
}

fn rect(doc: &Document, obj: &Object) -> Option<[f32; 4]> {
    let (_, resolved) = doc.dereference(obj).ok()?;
    let values: Vec<f32> = resolved
        .as_array()
        .ok()?
        .iter()
        .filter_map(|o| match doc.dereference(o).ok()?.1 {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r),
            _ => None,
        })
        .collect();

    match values[..] {
        [x0, y0, x1, y1] => Some([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]),
        _ => None,
    }
}

/// Transformation mapping `src` into `dst`, uniformly scaled and centred.
fn fit_matrix(src: [f32; 4], dst: [f32; 4]) -> [f32; 6] {
    let (src_w, src_h) = (src[2] - src[0], src[3] - src[1]);
    let (dst_w, dst_h) = (dst[2] - dst[0], dst[3] - dst[1]);
    if src_w <= 0.0 || src_h <= 0.0 {
        return [1.0, 0.0, 0.0, 1.0, dst[0], dst[1]];
    }

    let scale = (dst_w / src_w).min(dst_h / src_h);
    let tx = dst[0] + (dst_w - src_w * scale) / 2.0 - src[0] * scale;
    let ty = dst[1] + (dst_h - src_h * scale) / 2.0 - src[1] * scale;
    [scale, 0.0, 0.0, scale, tx, ty]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use pretty_assertions::assert_eq;

    struct Inputs {
        _dir: tempfile::TempDir,
        target: PathBuf,
        overlay: PathBuf,
        last_page: PathBuf,
    }

    fn inputs(target_pages: &[&[&str]]) -> Inputs {
        let dir = tempfile::tempdir().unwrap();
        let target = fixtures::write(dir.path(), "invoice.pdf", &fixtures::text_pdf(target_pages));
        let overlay = fixtures::write(dir.path(), "stamp.pdf", &fixtures::text_pdf(&[&["PAID"]]));
        let last_page = fixtures::write(
            dir.path(),
            "terms.pdf",
            &fixtures::text_pdf(&[&["APPENDIX TERMS"], &["UNUSED SECOND"]]),
        );
        Inputs {
            _dir: dir,
            target,
            overlay,
            last_page,
        }
    }

    fn references_form(doc: &Document, page_id: ObjectId) -> bool {
        let Some(resources) = inherited(doc, page_id, b"Resources") else {
            return false;
        };
        let Ok(resources) = resolve_dict(doc, &resources) else {
            return false;
        };
        let Ok(xobjects) = resources.get(b"XObject").and_then(|x| x.as_dict()) else {
            return false;
        };
        xobjects.iter().any(|(_, obj)| {
            let Ok(id) = obj.as_reference() else {
                return false;
            };
            matches!(
                doc.get_object(id),
                Ok(Object::Stream(s)) if matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Form")
            )
        })
    }

    #[test]
    fn test_three_pages_plus_appendix() {
        let io = inputs(&[&["PAGE ONE"], &["PAGE TWO"], &["PAGE THREE"]]);
        apply_overlay(&io.target, &io.overlay, &io.last_page).unwrap();

        let doc = Document::load(&io.target).unwrap();
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        assert_eq!(pages.len(), 4);

        for &page_id in &pages[..3] {
            assert!(references_form(&doc, page_id), "page {:?} not stamped", page_id);
            let content = doc.get_page_content(page_id).unwrap();
            assert!(content.windows(2).any(|w| w == b"Do"));
        }

        let last = doc.get_page_content(pages[3]).unwrap();
        let last = String::from_utf8_lossy(&last);
        assert!(last.contains("APPENDIX TERMS"), "got {}", last);
        assert!(!last.contains("UNUSED SECOND"));
        assert!(!references_form(&doc, pages[3]));
    }

    #[test]
    fn test_original_content_kept() {
        let io = inputs(&[&["SALES PERSON: AGT123"]]);
        apply_overlay(&io.target, &io.overlay, &io.last_page).unwrap();

        let doc = Document::load(&io.target).unwrap();
        let first = *doc.get_pages().values().next().unwrap();
        let content = doc.get_page_content(first).unwrap();
        assert!(String::from_utf8_lossy(&content).contains("SALES PERSON: AGT123"));
    }

    #[test]
    fn test_no_temp_file_after_success() {
        let io = inputs(&[&["PAGE ONE"]]);
        apply_overlay(&io.target, &io.overlay, &io.last_page).unwrap();
        assert!(!temp_path_for(&io.target).exists());
    }

    #[test]
    fn test_inputs_untouched() {
        let io = inputs(&[&["PAGE ONE"]]);
        let overlay_before = fs::read(&io.overlay).unwrap();
        let last_before = fs::read(&io.last_page).unwrap();

        OverlayCompositor::new(OverlayConfig::new(&io.overlay, &io.last_page))
            .apply(&io.target)
            .unwrap();

        assert_eq!(fs::read(&io.overlay).unwrap(), overlay_before);
        assert_eq!(fs::read(&io.last_page).unwrap(), last_before);
    }

    #[test]
    fn test_empty_target_fails_cleanly() {
        let io = inputs(&[]);
        let before = fs::read(&io.target).unwrap();

        let err = apply_overlay(&io.target, &io.overlay, &io.last_page).unwrap_err();
        assert!(matches!(err, OverlayError::EmptyDocument { ref path } if path == &io.target));
        assert_eq!(fs::read(&io.target).unwrap(), before);
        assert!(!temp_path_for(&io.target).exists());
    }

    #[test]
    fn test_empty_overlay_fails() {
        let io = inputs(&[&["PAGE ONE"]]);
        fs::write(&io.overlay, fixtures::empty_pdf()).unwrap();

        let err = apply_overlay(&io.target, &io.overlay, &io.last_page).unwrap_err();
        assert!(matches!(err, OverlayError::EmptyDocument { ref path } if path == &io.overlay));
    }

    #[test]
    fn test_malformed_overlay_leaves_target() {
        let io = inputs(&[&["PAGE ONE"]]);
        fs::write(&io.overlay, b"%PDF-1.5 garbage").unwrap();
        let before = fs::read(&io.target).unwrap();

        let err = apply_overlay(&io.target, &io.overlay, &io.last_page).unwrap_err();
        assert!(matches!(err, OverlayError::Load { .. }));
        assert_eq!(fs::read(&io.target).unwrap(), before);
        assert!(!temp_path_for(&io.target).exists());
    }

    #[test]
    fn test_stale_temp_removed_on_failure() {
        let io = inputs(&[&["PAGE ONE"]]);
        fs::write(temp_path_for(&io.target), b"stale").unwrap();
        fs::write(&io.last_page, b"not a pdf").unwrap();

        assert!(apply_overlay(&io.target, &io.overlay, &io.last_page).is_err());
        assert!(!temp_path_for(&io.target).exists());
    }

    #[test]
    fn test_temp_path_for() {
        assert_eq!(
            temp_path_for(Path::new("/out/A_1_B.pdf")),
            PathBuf::from("/out/A_1_B_temp.pdf")
        );
    }

    #[test]
    fn test_fit_matrix_scales_and_centres() {
        assert_eq!(
            fit_matrix([0.0, 0.0, 306.0, 396.0], [0.0, 0.0, 612.0, 792.0]),
            [2.0, 0.0, 0.0, 2.0, 0.0, 0.0]
        );
        // Square stamp on a portrait page: width-bound, centred vertically.
        assert_eq!(
            fit_matrix([0.0, 0.0, 100.0, 100.0], [0.0, 0.0, 200.0, 400.0]),
            [2.0, 0.0, 0.0, 2.0, 0.0, 100.0]
        );
    }

    #[test]
    fn test_from_parts_requires_both() {
        assert!(OverlayConfig::from_parts(Some("a.pdf".into()), None).is_none());
        assert!(OverlayConfig::from_parts(None, Some("b.pdf".into())).is_none());
        assert_eq!(
            OverlayConfig::from_parts(Some("a.pdf".into()), Some("b.pdf".into())),
            Some(OverlayConfig::new("a.pdf", "b.pdf"))
        );
    }
}
