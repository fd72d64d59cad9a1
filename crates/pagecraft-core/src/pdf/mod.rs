//! PDF document library.
//!
//! The core never touches PDF bytes directly; it goes through
//! [`DocumentLibrary`], which loads, copies pages between, and saves
//! documents. [`LopdfLibrary`] is the implementation backed by lopdf.

mod library;

pub use library::{LopdfLibrary, LopdfPage, PdfDocument};
pub(crate) use library::{inherited_attribute, media_box_size};

use crate::error::DocumentError;

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, DocumentError>;

/// MIME type of PDF output.
pub const PDF_MIME: &str = "application/pdf";

/// Operations the core needs from a PDF codec.
pub trait DocumentLibrary {
    /// A loaded or newly created document.
    type Document;

    /// A page copied out of a document, not yet added to one.
    type Page;

    /// Create an empty document.
    fn create(&self) -> Self::Document;

    /// Decode a document from bytes.
    fn load(&self, bytes: &[u8]) -> Result<Self::Document>;

    /// Number of pages in a document.
    fn page_count(&self, doc: &Self::Document) -> usize;

    /// Copy pages of `src` (0-indexed, in the given order, repeats allowed)
    /// so they can be added to `dest`.
    fn copy_pages(
        &self,
        dest: &mut Self::Document,
        src: &Self::Document,
        indices: &[usize],
    ) -> Result<Vec<Self::Page>>;

    /// Append a copied page to the end of a document.
    fn add_page(&self, doc: &mut Self::Document, page: Self::Page) -> Result<()>;

    /// Rotate a page by `degrees` on top of its current rotation.
    fn set_rotation(&self, page: &mut Self::Page, degrees: i32);

    /// Append a page showing a JPEG image at its natural size.
    fn add_image_page(
        &self,
        doc: &mut Self::Document,
        jpeg: &[u8],
        width: u32,
        height: u32,
    ) -> Result<()>;

    /// Serialize a document.
    fn save(&self, doc: &mut Self::Document) -> Result<Vec<u8>>;
}

/// Helpers for building PDFs in tests.
#[cfg(test)]
pub(crate) mod testing {
    use lopdf::content::{Content, Operation};
    use lopdf::{Dictionary, Document, Object, Stream};

    /// A PDF with `num_pages` pages; page `i` (0-indexed) is `100 + i` points wide.
    pub fn sample_pdf(num_pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut page_ids = Vec::new();
        for i in 0..num_pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Td", vec![Object::Integer(10), Object::Integer(10)]),
                    Operation::new(
                        "Tj",
                        vec![Object::String(
                            format!("Page {}", i + 1).into_bytes(),
                            lopdf::StringFormat::Literal,
                        )],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(100 + i as i64),
                        Object::Integer(200),
                    ]),
                ),
                ("Contents", Object::Reference(content_id)),
            ]);
            page_ids.push(doc.add_object(page));
        }

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(num_pages as i64)),
            (
                "Kids",
                Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    /// Page widths of a saved PDF, in page order.
    pub fn page_widths(bytes: &[u8]) -> Vec<i64> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|&id| {
                let (w, _) = super::media_box_size(&doc, id);
                w as i64
            })
            .collect()
    }

    /// `/Rotate` of each page of a saved PDF.
    pub fn page_rotations(bytes: &[u8]) -> Vec<i64> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|&id| {
                super::inherited_attribute(&doc, id, b"Rotate")
                    .and_then(|o| o.as_i64().ok())
                    .unwrap_or(0)
            })
            .collect()
    }
}
