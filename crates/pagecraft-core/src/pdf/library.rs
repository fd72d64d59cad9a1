//! lopdf-backed document library.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, trace};

use super::{DocumentLibrary, Result};
use crate::error::DocumentError;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `/Parent` chains in broken files.
const MAX_TREE_DEPTH: usize = 64;

/// US Letter, used when a page has no usable `/MediaBox`.
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// A PDF document together with the root of its page tree.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    inner: Document,
    pages_id: ObjectId,
}

impl PdfDocument {
    pub fn page_count(&self) -> usize {
        self.inner.get_pages().len()
    }

    pub fn inner(&self) -> &Document {
        &self.inner
    }
}

/// A page copied out of a source document, with inherited attributes
/// resolved so it no longer depends on the source page tree.
#[derive(Debug, Clone)]
pub struct LopdfPage {
    dict: Dictionary,
}

impl LopdfPage {
    /// Current `/Rotate` value in degrees.
    pub fn rotation(&self) -> i64 {
        self.dict
            .get(b"Rotate")
            .and_then(Object::as_i64)
            .unwrap_or(0)
    }
}

/// [`DocumentLibrary`] implementation using lopdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfLibrary;

impl LopdfLibrary {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentLibrary for LopdfLibrary {
    type Document = PdfDocument;
    type Page = LopdfPage;

    fn create(&self) -> PdfDocument {
        let mut inner = Document::with_version("1.7");
        let pages_id = inner.new_object_id();
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(0)),
            ("Kids", Object::Array(Vec::new())),
        ]);
        inner.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = inner.add_object(catalog);
        inner.trailer.set("Root", Object::Reference(catalog_id));

        PdfDocument { inner, pages_id }
    }

    fn load(&self, bytes: &[u8]) -> Result<PdfDocument> {
        let mut inner =
            Document::load_mem(bytes).map_err(|e| DocumentError::Decode(e.to_string()))?;

        // Files protected only by an empty user password open without prompting.
        if inner.is_encrypted() {
            if inner.decrypt("").is_err() {
                return Err(DocumentError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");
        }

        let pages_id = inner
            .catalog()
            .and_then(|catalog| catalog.get(b"Pages"))
            .and_then(Object::as_reference)
            .map_err(|e| DocumentError::Decode(format!("missing page tree: {e}")))?;

        let page_count = inner.get_pages().len();
        if page_count == 0 {
            return Err(DocumentError::NoPages);
        }

        debug!("Loaded PDF with {} pages ({} bytes)", page_count, bytes.len());
        Ok(PdfDocument { inner, pages_id })
    }

    fn page_count(&self, doc: &PdfDocument) -> usize {
        doc.page_count()
    }

    fn copy_pages(
        &self,
        dest: &mut PdfDocument,
        src: &PdfDocument,
        indices: &[usize],
    ) -> Result<Vec<LopdfPage>> {
        let count = src.page_count();
        if let Some(&index) = indices.iter().find(|&&i| i >= count) {
            return Err(DocumentError::InvalidPage { index, count });
        }

        // Give the source objects ids that cannot collide with dest.
        let mut source = src.inner.clone();
        source.renumber_objects_with(dest.inner.max_id + 1);
        let page_ids = source.get_pages();

        let mut pages = Vec::with_capacity(indices.len());
        for &index in indices {
            let page_id = page_ids
                .get(&(index as u32 + 1))
                .copied()
                .ok_or(DocumentError::InvalidPage { index, count })?;
            pages.push(LopdfPage {
                dict: flatten_page(&source, page_id)?,
            });
        }

        let mut moved = 0;
        for (id, object) in source.objects {
            if is_structural(&object) {
                continue;
            }
            dest.inner.max_id = dest.inner.max_id.max(id.0);
            dest.inner.objects.insert(id, object);
            moved += 1;
        }

        trace!("Copied {} pages, moved {} objects", pages.len(), moved);
        Ok(pages)
    }

    fn add_page(&self, doc: &mut PdfDocument, page: LopdfPage) -> Result<()> {
        let mut dict = page.dict;
        dict.set("Parent", Object::Reference(doc.pages_id));
        let page_id = doc.inner.add_object(dict);

        let pages = doc
            .inner
            .get_object_mut(doc.pages_id)
            .and_then(|o| o.as_dict_mut())
            .map_err(|e| DocumentError::Save(format!("page tree: {e}")))?;

        let count = match pages.get_mut(b"Kids") {
            Ok(Object::Array(kids)) => {
                kids.push(Object::Reference(page_id));
                kids.len()
            }
            _ => {
                pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
                1
            }
        };
        pages.set("Count", Object::Integer(count as i64));
        Ok(())
    }

    fn set_rotation(&self, page: &mut LopdfPage, degrees: i32) {
        let rotation = (page.rotation() + degrees as i64).rem_euclid(360);
        page.dict.set("Rotate", Object::Integer(rotation));
    }

    fn add_image_page(
        &self,
        doc: &mut PdfDocument,
        jpeg: &[u8],
        width: u32,
        height: u32,
    ) -> Result<()> {
        let image = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(width as i64)),
            ("Height", Object::Integer(height as i64)),
            ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
            ("Filter", Object::Name(b"DCTDecode".to_vec())),
        ]);
        let image_id = doc.inner.add_object(Stream::new(image, jpeg.to_vec()));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Integer(width as i64),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(height as i64),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| DocumentError::Image(e.to_string()))?;
        let content_id = doc.inner.add_object(Stream::new(Dictionary::new(), encoded));

        let xobjects = Dictionary::from_iter(vec![("Im0", Object::Reference(image_id))]);
        let resources = Dictionary::from_iter(vec![("XObject", Object::Dictionary(xobjects))]);
        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width as i64),
                    Object::Integer(height as i64),
                ]),
            ),
            ("Resources", Object::Dictionary(resources)),
            ("Contents", Object::Reference(content_id)),
        ]);

        self.add_page(doc, LopdfPage { dict: page })
    }

    fn save(&self, doc: &mut PdfDocument) -> Result<Vec<u8>> {
        let pruned = doc.inner.prune_objects();
        let mut buffer = Vec::new();
        doc.inner
            .save_to(&mut buffer)
            .map_err(|e| DocumentError::Save(e.to_string()))?;
        debug!(
            "Saved PDF with {} pages ({} bytes, pruned {} objects)",
            doc.page_count(),
            buffer.len(),
            pruned.len()
        );
        Ok(buffer)
    }
}

/// Clone a page dictionary with its inherited attributes made explicit.
fn flatten_page(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut dict = doc
        .get_dictionary(page_id)
        .map_err(|e| DocumentError::Decode(e.to_string()))?
        .clone();

    for key in INHERITABLE {
        if !dict.has(key) {
            if let Some(value) = inherited_attribute(doc, page_id, key) {
                dict.set(key.to_vec(), value);
            }
        }
    }
    dict.remove(b"Parent");
    Ok(dict)
}

/// Catalog and page tree nodes stay with their source document.
fn is_structural(object: &Object) -> bool {
    let Object::Dictionary(dict) = object else {
        return false;
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Catalog") | Ok(b"Pages") | Ok(b"Page")
    )
}

/// Look up `key` on a page, walking up `/Parent` links when the page does not
/// carry it. The value is returned as stored, references included.
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(node).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        node = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

/// Width and height of a page's media box in points.
pub(crate) fn media_box_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let Some(media_box) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return DEFAULT_PAGE_SIZE;
    };
    let values: Vec<f32> = match doc.dereference(&media_box) {
        Ok((_, Object::Array(items))) => items.iter().filter_map(number).collect(),
        _ => Vec::new(),
    };
    match values.as_slice() {
        [x0, y0, x1, y1] if (x1 - x0).abs() > 0.0 && (y1 - y0).abs() > 0.0 => {
            ((x1 - x0).abs(), (y1 - y0).abs())
        }
        _ => DEFAULT_PAGE_SIZE,
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testing::{page_rotations, page_widths, sample_pdf};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_counts_pages() {
        let lib = LopdfLibrary::new();
        let doc = lib.load(&sample_pdf(4)).unwrap();
        assert_eq!(lib.page_count(&doc), 4);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let lib = LopdfLibrary::new();
        let err = lib.load(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, DocumentError::Decode(_)));
    }

    #[test]
    fn test_copy_pages_preserves_order_and_duplicates() {
        let lib = LopdfLibrary::new();
        let src = lib.load(&sample_pdf(4)).unwrap();
        let mut dest = lib.create();

        let pages = lib.copy_pages(&mut dest, &src, &[3, 0, 3]).unwrap();
        for page in pages {
            lib.add_page(&mut dest, page).unwrap();
        }
        let bytes = lib.save(&mut dest).unwrap();
        assert_eq!(page_widths(&bytes), vec![103, 100, 103]);
    }

    #[test]
    fn test_copy_pages_from_several_sources() {
        let lib = LopdfLibrary::new();
        let a = lib.load(&sample_pdf(2)).unwrap();
        let b = lib.load(&sample_pdf(3)).unwrap();
        let mut dest = lib.create();

        for (src, indices) in [(&a, vec![0, 1]), (&b, vec![2])] {
            for page in lib.copy_pages(&mut dest, src, &indices).unwrap() {
                lib.add_page(&mut dest, page).unwrap();
            }
        }
        let bytes = lib.save(&mut dest).unwrap();
        assert_eq!(page_widths(&bytes), vec![100, 101, 102]);
    }

    #[test]
    fn test_copy_pages_rejects_out_of_range() {
        let lib = LopdfLibrary::new();
        let src = lib.load(&sample_pdf(2)).unwrap();
        let mut dest = lib.create();
        let err = lib.copy_pages(&mut dest, &src, &[0, 2]).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidPage { index: 2, count: 2 }));
    }

    #[test]
    fn test_set_rotation_is_additive() {
        let lib = LopdfLibrary::new();
        let src = lib.load(&sample_pdf(1)).unwrap();
        let mut dest = lib.create();

        let mut page = lib.copy_pages(&mut dest, &src, &[0]).unwrap().remove(0);
        lib.set_rotation(&mut page, 90);
        lib.set_rotation(&mut page, 180);
        assert_eq!(page.rotation(), 270);
        lib.set_rotation(&mut page, -270);
        assert_eq!(page.rotation(), 0);

        lib.set_rotation(&mut page, -90);
        lib.add_page(&mut dest, page).unwrap();
        let bytes = lib.save(&mut dest).unwrap();
        assert_eq!(page_rotations(&bytes), vec![270]);
    }

    #[test]
    fn test_add_image_page_uses_image_size() {
        let lib = LopdfLibrary::new();
        let mut doc = lib.create();
        lib.add_image_page(&mut doc, &[0xFF, 0xD8, 0xFF, 0xD9], 320, 240)
            .unwrap();
        let bytes = lib.save(&mut doc).unwrap();
        assert_eq!(page_widths(&bytes), vec![320]);
    }
}
