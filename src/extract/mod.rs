// src/extract/mod.rs
//! Page-by-page table extraction.
//!
//! A [`PageSource`] yields positioned text per page; [`TableExtractor`]
//! turns it into [`RawTable`]s, one page at a time, keeping each page's
//! failure local to that page.

pub mod grid;
pub mod layout;
pub mod text_rows;

use crate::{
    config::ExtractionConfig,
    error::{PageError, PipelineError},
};
use layout::TextFragment;
use lopdf::{content::Content, Document, ObjectId};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Page the table was found on (1-based).
    pub page: u32,
    /// Position among the tables of that page, top first.
    pub index: usize,
    /// First row as printed. May hold empty, merged or repeated labels.
    pub headers: Vec<String>,
    /// Every following row, one String per cell (empty for a blank cell).
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Split off the first row as the header.
    pub fn from_rows(page: u32, index: usize, mut rows: Vec<Vec<String>>) -> Self {
        let headers = if rows.is_empty() {
            Vec::new()
        } else {
            rows.remove(0)
        };
        Self {
            page,
            index,
            headers,
            rows,
        }
    }
}

/// Where page text comes from.
pub trait PageSource {
    /// Page numbers in document order (1-based).
    fn page_numbers(&self) -> Vec<u32>;

    /// Positioned text of one page.
    fn fragments(&self, page: u32) -> Result<Vec<TextFragment>, PageError>;
}

/// A PDF opened with lopdf. The handle lives as long as this value.
pub struct PdfDocument {
    path: PathBuf,
    doc: Document,
    pages: BTreeMap<u32, ObjectId>,
}

impl PdfDocument {
    #[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let not_found = |source: io::Error| PipelineError::NotFound {
            path: path.to_path_buf(),
            source,
        };

        let meta = fs::metadata(path).map_err(not_found)?;
        if !meta.is_file() {
            return Err(not_found(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        // readable, not merely present
        File::open(path).map_err(not_found)?;

        let doc = Document::load(path)
            .map_err(|e| PipelineError::invalid_format(path, format!("cannot parse PDF: {e}")))?;
        let pages = doc.get_pages();
        info!(pages = pages.len(), "opened pdf");

        Ok(Self {
            path: path.to_path_buf(),
            doc,
            pages,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageSource for PdfDocument {
    fn page_numbers(&self) -> Vec<u32> {
        self.pages.keys().copied().collect()
    }

    fn fragments(&self, page: u32) -> Result<Vec<TextFragment>, PageError> {
        let id = self
            .pages
            .get(&page)
            .ok_or_else(|| PageError::Malformed(format!("page {page} is not in the page tree")))?;
        let data = self.doc.get_page_content(*id)?;
        let content = Content::decode(&data)?;
        layout::interpret_page(&content.operations, layout::Forms::of_page(&self.doc, *id))
    }
}

/// Tables of one page, or why the page was skipped.
#[derive(Debug)]
pub struct PageOutcome {
    pub page: u32,
    pub result: Result<Vec<RawTable>, PageError>,
}

pub struct TableExtractor<S = PdfDocument> {
    source: S,
    config: ExtractionConfig,
}

impl TableExtractor<PdfDocument> {
    /// Open `path` as a PDF. Fails only when the file is missing or not a PDF.
    pub fn open(path: impl AsRef<Path>, config: &ExtractionConfig) -> Result<Self, PipelineError> {
        Ok(Self::new(PdfDocument::open(path)?, config.clone()))
    }
}

impl<S: PageSource> TableExtractor<S> {
    pub fn new(source: S, config: ExtractionConfig) -> Self {
        Self { source, config }
    }

    pub fn page_count(&self) -> usize {
        self.source.page_numbers().len()
    }

    /// Lazily extract page after page, in document order.
    pub fn pages(&self) -> Pages<'_, S> {
        Pages {
            extractor: self,
            numbers: self.source.page_numbers().into_iter(),
        }
    }

    fn extract_page(&self, page: u32) -> Result<Vec<RawTable>, PageError> {
        let fragments = self.source.fragments(page)?;
        let lines = grid::group_lines(&fragments, &self.config);
        let tables = grid::detect_tables(&lines, page, &self.config);

        if tables.is_empty() && self.config.text_line_fallback {
            let texts: Vec<String> = lines.iter().map(grid::Line::text).collect();
            if let Some(table) = text_rows::parse_lines(texts.iter().map(String::as_str), page) {
                debug!(page, rows = table.rows.len(), "page read with line patterns");
                return Ok(vec![table]);
            }
        }

        debug!(page, fragments = fragments.len(), tables = tables.len(), "page laid out");
        Ok(tables)
    }
}

pub struct Pages<'a, S> {
    extractor: &'a TableExtractor<S>,
    numbers: std::vec::IntoIter<u32>,
}

impl<S: PageSource> Iterator for Pages<'_, S> {
    type Item = PageOutcome;

    fn next(&mut self) -> Option<PageOutcome> {
        let page = self.numbers.next()?;
        let result = self.extractor.extract_page(page);
        if let Err(e) = &result {
            warn!(page, error = %e, "page skipped");
        }
        Some(PageOutcome { page, result })
    }
}

/// Builds small PDFs with lopdf for tests.
#[cfg(test)]
pub(crate) mod testpdf {
    use anyhow::Result;
    use lopdf::{
        content::{Content, Operation},
        dictionary, Document, Object, Stream,
    };
    use std::path::Path;

    pub const COLUMN_XS: [i64; 6] = [50, 120, 190, 280, 380, 470];
    const TOP: i64 = 750;
    const PITCH: i64 = 15;

    pub fn shown_at(x: i64, y: i64, text: &str) -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 9.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ]
    }

    /// One text object per non-empty cell, rows top-down on fixed columns.
    pub fn table_ops(rows: &[&[&str]]) -> Vec<Operation> {
        let mut ops = Vec::new();
        for (r, row) in rows.iter().enumerate() {
            let y = TOP - PITCH * r as i64;
            for (cell, x) in row.iter().zip(COLUMN_XS) {
                if !cell.is_empty() {
                    ops.extend(shown_at(x, y, cell));
                }
            }
        }
        ops
    }

    /// Each line shown as a single string.
    pub fn line_ops(lines: &[&str]) -> Vec<Operation> {
        lines
            .iter()
            .enumerate()
            .flat_map(|(i, line)| shown_at(COLUMN_XS[0], TOP - PITCH * i as i64, line))
            .collect()
    }

    /// A page whose `Td` carries strings instead of numbers.
    pub fn broken_ops() -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Td",
                vec![Object::string_literal("x"), Object::string_literal("y")],
            ),
            Operation::new("Tj", vec![Object::string_literal("lost")]),
            Operation::new("ET", vec![]),
        ]
    }

    pub fn write_pdf(path: &Path, pages: Vec<Vec<Operation>>) -> Result<()> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        for operations in pages {
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();
        doc.save(path)?;
        Ok(())
    }
}
