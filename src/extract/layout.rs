//! Content-stream interpretation: where each shown string lands on the page.
//!
//! Only the text-positioning operators and the CTM are tracked, and form
//! XObjects painted with `Do` are walked in place. Glyph
//! widths are estimated from the font size since font programs are not
//! read; that is precise enough to order cells and tell columns apart.

use crate::error::PageError;
use lopdf::{
    content::{Content, Operation},
    Dictionary, Document, Object, ObjectId,
};

/// Average glyph advance as a fraction of the font size.
const AVG_GLYPH_WIDTH: f64 = 0.5;
/// TJ adjustments below this (thousandths of text space) read as a word gap.
const TJ_SPACE_THRESHOLD: f64 = -200.0;
const DEFAULT_FONT_SIZE: f64 = 10.0;
/// Forms nested deeper than this are not painted (guards against cycles).
const MAX_FORM_DEPTH: usize = 8;

/// One shown string, positioned in page space (origin bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub text: String,
}

impl TextFragment {
    pub fn new(x: f64, y: f64, width: f64, text: impl Into<String>) -> Self {
        Self {
            x,
            y,
            width,
            text: text.into(),
        }
    }

    pub fn end(&self) -> f64 {
        self.x + self.width
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translation(tx: f64, ty: f64) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other` in PDF's row-vector convention.
    fn then(self, other: Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    fn origin(self) -> (f64, f64) {
        (self.0[4], self.0[5])
    }
}

/// Form XObjects reachable from a content stream's resources.
#[derive(Clone, Copy)]
pub struct Forms<'a> {
    doc: &'a Document,
    resources: Option<&'a Dictionary>,
}

struct Form<'a> {
    matrix: Matrix,
    operations: Vec<Operation>,
    forms: Forms<'a>,
}

impl<'a> Forms<'a> {
    /// The page's own resources, or the nearest inherited ones.
    pub fn of_page(doc: &'a Document, page: ObjectId) -> Self {
        let (inline, inherited) = doc.get_page_resources(page);
        let resources =
            inline.or_else(|| inherited.iter().find_map(|id| doc.get_dictionary(*id).ok()));
        Self { doc, resources }
    }

    fn entry(&self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        let obj = dict.get(key).ok()?;
        self.doc.dereference(obj).ok().map(|(_, obj)| obj)
    }

    /// `None` when the name is unknown or is not a form (images are ignored).
    fn form(&self, name: &[u8]) -> Result<Option<Form<'a>>, PageError> {
        let Some(xobjects) = self
            .resources
            .and_then(|r| self.entry(r, b"XObject"))
            .and_then(|o| o.as_dict().ok())
        else {
            return Ok(None);
        };
        let Some(stream) = self.entry(xobjects, name).and_then(|o| o.as_stream().ok()) else {
            return Ok(None);
        };
        if stream.dict.get(b"Subtype").and_then(Object::as_name).ok() != Some(b"Form".as_slice()) {
            return Ok(None);
        }

        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let content = Content::decode(&data)?;
        let matrix = match stream.dict.get(b"Matrix").and_then(Object::as_array) {
            Ok(items) => numbers(items, "form matrix")?,
            Err(_) => Matrix::IDENTITY,
        };
        let resources = self
            .entry(&stream.dict, b"Resources")
            .and_then(|o| o.as_dict().ok())
            .or(self.resources);

        Ok(Some(Form {
            matrix,
            operations: content.operations,
            forms: Forms {
                doc: self.doc,
                resources,
            },
        }))
    }
}

struct Interpreter<'a> {
    forms: Option<Forms<'a>>,
    depth: usize,
    ctm: Matrix,
    saved: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    leading: f64,
    font_size: f64,
    fragments: Vec<TextFragment>,
}

/// Walk decoded operations and collect every non-blank shown string.
/// `Do` is ignored since there are no resources to resolve it against.
pub fn interpret(operations: &[Operation]) -> Result<Vec<TextFragment>, PageError> {
    run(operations, None)
}

/// Like [`interpret`], also painting the form XObjects the page uses.
pub fn interpret_page(
    operations: &[Operation],
    forms: Forms<'_>,
) -> Result<Vec<TextFragment>, PageError> {
    run(operations, Some(forms))
}

fn run(
    operations: &[Operation],
    forms: Option<Forms<'_>>,
) -> Result<Vec<TextFragment>, PageError> {
    let mut it = Interpreter {
        forms,
        depth: 0,
        ctm: Matrix::IDENTITY,
        saved: Vec::new(),
        tm: Matrix::IDENTITY,
        tlm: Matrix::IDENTITY,
        leading: 0.0,
        font_size: DEFAULT_FONT_SIZE,
        fragments: Vec::new(),
    };
    for op in operations {
        it.step(op)?;
    }
    Ok(it.fragments)
}

impl Interpreter<'_> {
    fn step(&mut self, op: &Operation) -> Result<(), PageError> {
        match op.operator.as_str() {
            "q" => self.saved.push(self.ctm),
            "Q" => {
                if let Some(m) = self.saved.pop() {
                    self.ctm = m;
                }
            }
            "cm" => self.ctm = matrix(op)?.then(self.ctm),
            "BT" => {
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "Tf" => self.font_size = number(op, 1)?,
            "TL" => self.leading = number(op, 0)?,
            "Td" => {
                let (tx, ty) = (number(op, 0)?, number(op, 1)?);
                self.next_line(tx, ty);
            }
            "TD" => {
                let (tx, ty) = (number(op, 0)?, number(op, 1)?);
                self.leading = -ty;
                self.next_line(tx, ty);
            }
            "Tm" => {
                let m = matrix(op)?;
                self.tm = m;
                self.tlm = m;
            }
            "T*" => self.next_line(0.0, -self.leading),
            "Tj" => {
                let text = string(op, 0)?;
                self.show(text);
            }
            "'" => {
                self.next_line(0.0, -self.leading);
                let text = string(op, 0)?;
                self.show(text);
            }
            "\"" => {
                self.next_line(0.0, -self.leading);
                let text = string(op, 2)?;
                self.show(text);
            }
            "TJ" => self.show_array(op)?,
            "Do" => self.paint_form(op)?,
            _ => {}
        }
        Ok(())
    }

    fn paint_form(&mut self, op: &Operation) -> Result<(), PageError> {
        let name = match op.operands.first() {
            Some(Object::Name(name)) => name,
            _ => return Err(PageError::operand(&op.operator, "a name operand")),
        };
        let Some(forms) = self.forms else {
            return Ok(());
        };
        if self.depth >= MAX_FORM_DEPTH {
            return Ok(());
        }
        let Some(form) = forms.form(name)? else {
            return Ok(());
        };

        let outer = (self.ctm, self.saved.len(), self.forms);
        self.ctm = form.matrix.then(self.ctm);
        self.forms = Some(form.forms);
        self.depth += 1;
        let painted = form.operations.iter().try_for_each(|inner| self.step(inner));
        self.depth -= 1;
        self.saved.truncate(outer.1);
        (self.ctm, _, self.forms) = outer;
        painted
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.tlm = Matrix::translation(tx, ty).then(self.tlm);
        self.tm = self.tlm;
    }

    fn glyph_advance(&self, text: &str) -> f64 {
        text.chars().count() as f64 * self.font_size * AVG_GLYPH_WIDTH
    }

    fn show(&mut self, text: String) {
        let advance = self.glyph_advance(&text);
        self.emit(text, advance);
    }

    fn show_array(&mut self, op: &Operation) -> Result<(), PageError> {
        let items = match op.operands.first() {
            Some(Object::Array(items)) => items,
            _ => return Err(PageError::operand(&op.operator, "an array operand")),
        };
        let mut text = String::new();
        let mut advance = 0.0;
        for item in items {
            match item {
                Object::String(bytes, _) => {
                    let piece = decode_text(bytes);
                    advance += self.glyph_advance(&piece);
                    text.push_str(&piece);
                }
                Object::Integer(_) | Object::Real(_) => {
                    let adjust = as_f64(item).unwrap_or(0.0);
                    advance -= adjust / 1000.0 * self.font_size;
                    if adjust < TJ_SPACE_THRESHOLD && !text.ends_with(' ') {
                        text.push(' ');
                    }
                }
                _ => return Err(PageError::operand(&op.operator, "strings and numbers")),
            }
        }
        self.emit(text, advance);
        Ok(())
    }

    fn emit(&mut self, text: String, advance: f64) {
        let (x, y) = self.tm.then(self.ctm).origin();
        self.tm = Matrix::translation(advance, 0.0).then(self.tm);
        let (end_x, _) = self.tm.then(self.ctm).origin();
        if !text.trim().is_empty() {
            self.fragments.push(TextFragment {
                x,
                y,
                width: (end_x - x).abs(),
                text,
            });
        }
    }
}

fn as_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn number(op: &Operation, idx: usize) -> Result<f64, PageError> {
    op.operands
        .get(idx)
        .and_then(as_f64)
        .ok_or_else(|| PageError::operand(&op.operator, "numeric operands"))
}

fn matrix(op: &Operation) -> Result<Matrix, PageError> {
    let mut m = [0.0; 6];
    for (i, slot) in m.iter_mut().enumerate() {
        *slot = number(op, i)?;
    }
    Ok(Matrix(m))
}

fn numbers(items: &[Object], what: &str) -> Result<Matrix, PageError> {
    let values: Vec<f64> = items.iter().filter_map(as_f64).collect();
    match <[f64; 6]>::try_from(values) {
        Ok(m) => Ok(Matrix(m)),
        Err(_) => Err(PageError::Malformed(format!("{what} needs six numbers"))),
    }
}

fn string(op: &Operation, idx: usize) -> Result<String, PageError> {
    match op.operands.get(idx) {
        Some(Object::String(bytes, _)) => Ok(decode_text(bytes)),
        _ => Err(PageError::operand(&op.operator, "a string operand")),
    }
}

/// UTF-16BE when the string carries a BOM, otherwise one char per byte
/// (close enough to WinAnsi for the Latin text these documents use).
pub fn decode_text(bytes: &[u8]) -> String {
    if let [0xFE, 0xFF, rest @ ..] = bytes {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}
