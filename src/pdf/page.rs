use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};

use crate::error::Result;

/// Top-down crop box: `top` is distance from the page's top edge, so
/// `top < bottom` always holds for a non-empty region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl Region {
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.top && y < self.bottom
    }
}

/// Geometry access for one page. The segmenter and column extractor only
/// see this surface, so tests can drive them with a scripted page.
pub trait PageView {
    fn bounds(&self) -> Region;
    /// Top and bottom edge of every drawn rectangle, top-down coordinates.
    fn rect_edges(&self) -> Vec<f64>;
    /// Top edge of every horizontal rule (thin rect or stroked line).
    fn rule_tops(&self) -> Vec<f64>;
    /// Text whose glyph origins fall inside the region, one string per
    /// visual line, top-to-bottom, left-to-right.
    fn text_within(&self, region: &Region) -> String;
}

// ── content-stream interpretation ──────────────────────────────────────────

/// Row-vector affine transform `[a b c d e f]`, PDF convention.
#[derive(Debug, Clone, Copy)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

const IDENTITY: Matrix = Matrix {
    a: 1.0,
    b: 0.0,
    c: 0.0,
    d: 1.0,
    e: 0.0,
    f: 0.0,
};

impl Matrix {
    fn translate(tx: f64, ty: f64) -> Matrix {
        Matrix {
            e: tx,
            f: ty,
            ..IDENTITY
        }
    }

    /// `self` applied first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }
}

fn as_num(obj: &Object) -> f64 {
    match obj {
        Object::Integer(i) => *i as f64,
        Object::Real(r) => *r as f64,
        _ => 0.0,
    }
}

fn num(operands: &[Object], i: usize) -> f64 {
    operands.get(i).map(as_num).unwrap_or(0.0)
}

/// One positioned character with the advance that placed it.
#[derive(Debug, Clone)]
struct Glyph {
    x: f64,
    y: f64,
    w: f64,
    c: char,
}

#[derive(Clone)]
struct TextState {
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    h_scale: f64,
    leading: f64,
    tm: Matrix,
}

// Without font metrics every glyph advances half an em, which is close
// enough to keep word gaps and column positions distinguishable in the
// fixed-layout report grids.
const GLYPH_ADVANCE: f64 = 0.5;
const RULE_MAX_HEIGHT: f64 = 1.0;
const LINE_TOLERANCE: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
enum PathOp {
    Move(f64, f64),
    Line(f64, f64),
    Rect(f64, f64, f64, f64),
}

/// One page, fully interpreted: glyph origins, rectangle boxes, and rule
/// positions in top-down device space.
pub struct PdfPage {
    width: f64,
    height: f64,
    glyphs: Vec<Glyph>,
    rects: Vec<Region>,
    rules: Vec<f64>,
}

impl PdfPage {
    pub fn from_document(doc: &Document, page_id: ObjectId) -> Result<PdfPage> {
        let [x0, y0, x1, y1] = media_box(doc, page_id);
        let mut page = PdfPage {
            width: x1 - x0,
            height: y1 - y0,
            glyphs: Vec::new(),
            rects: Vec::new(),
            rules: Vec::new(),
        };
        let content = Content::decode(&doc.get_page_content(page_id)?)?;
        page.walk(&content);
        Ok(page)
    }

    /// Every page of the document in order.
    pub fn load_all(doc: &Document) -> Result<Vec<PdfPage>> {
        doc.get_pages()
            .into_values()
            .map(|id| PdfPage::from_document(doc, id))
            .collect()
    }

    fn top_down(&self, x: f64, y: f64) -> (f64, f64) {
        (x, self.height - y)
    }

    fn walk(&mut self, content: &Content) {
        let mut ctm = IDENTITY;
        let mut ctm_stack: Vec<Matrix> = Vec::new();
        let mut ts = TextState {
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            tm: IDENTITY,
        };
        let mut tlm = IDENTITY;
        let mut path: Vec<PathOp> = Vec::new();

        for op in &content.operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => ctm_stack.push(ctm),
                "Q" => {
                    if let Some(m) = ctm_stack.pop() {
                        ctm = m;
                    }
                }
                "cm" => {
                    let m = Matrix {
                        a: num(operands, 0),
                        b: num(operands, 1),
                        c: num(operands, 2),
                        d: num(operands, 3),
                        e: num(operands, 4),
                        f: num(operands, 5),
                    };
                    ctm = m.then(&ctm);
                }
                "BT" | "ET" => {
                    tlm = IDENTITY;
                    ts.tm = tlm;
                }
                "Tf" => ts.font_size = num(operands, 1),
                "TL" => ts.leading = num(operands, 0),
                "Tc" => ts.char_spacing = num(operands, 0),
                "Tw" => ts.word_spacing = num(operands, 0),
                "Tz" => ts.h_scale = num(operands, 0) / 100.0,
                "Td" => {
                    tlm = Matrix::translate(num(operands, 0), num(operands, 1)).then(&tlm);
                    ts.tm = tlm;
                }
                "TD" => {
                    ts.leading = -num(operands, 1);
                    tlm = Matrix::translate(num(operands, 0), num(operands, 1)).then(&tlm);
                    ts.tm = tlm;
                }
                "Tm" => {
                    tlm = Matrix {
                        a: num(operands, 0),
                        b: num(operands, 1),
                        c: num(operands, 2),
                        d: num(operands, 3),
                        e: num(operands, 4),
                        f: num(operands, 5),
                    };
                    ts.tm = tlm;
                }
                "T*" => {
                    tlm = Matrix::translate(0.0, -ts.leading).then(&tlm);
                    ts.tm = tlm;
                }
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show_text(&mut ts, &ctm, bytes);
                    }
                }
                "'" => {
                    tlm = Matrix::translate(0.0, -ts.leading).then(&tlm);
                    ts.tm = tlm;
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show_text(&mut ts, &ctm, bytes);
                    }
                }
                "\"" => {
                    ts.word_spacing = num(operands, 0);
                    ts.char_spacing = num(operands, 1);
                    tlm = Matrix::translate(0.0, -ts.leading).then(&tlm);
                    ts.tm = tlm;
                    if let Some(Object::String(bytes, _)) = operands.get(2) {
                        self.show_text(&mut ts, &ctm, bytes);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.show_text(&mut ts, &ctm, bytes),
                                Object::Integer(_) | Object::Real(_) => {
                                    let tx =
                                        -as_num(item) / 1000.0 * ts.font_size * ts.h_scale;
                                    ts.tm = Matrix::translate(tx, 0.0).then(&ts.tm);
                                }
                                _ => {}
                            }
                        }
                    }
                }
                "m" => path.push(PathOp::Move(num(operands, 0), num(operands, 1))),
                "l" => path.push(PathOp::Line(num(operands, 0), num(operands, 1))),
                "re" => path.push(PathOp::Rect(
                    num(operands, 0),
                    num(operands, 1),
                    num(operands, 2),
                    num(operands, 3),
                )),
                // Paint operators flush the path; "n" discards it, which is
                // how clip boxes stay out of the rect list.
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                    self.flush_path(&path, &ctm);
                    path.clear();
                }
                "n" => path.clear(),
                _ => {}
            }
        }
    }

    fn show_text(&mut self, ts: &mut TextState, ctm: &Matrix, bytes: &[u8]) {
        for &byte in bytes {
            // Latin-1 covers the portal's WinAnsi output for our fields.
            let c = byte as char;
            let advance = (GLYPH_ADVANCE * ts.font_size + ts.char_spacing
                + if byte == b' ' { ts.word_spacing } else { 0.0 })
                * ts.h_scale;
            if !c.is_control() {
                let trm = ts.tm.then(ctm);
                let (dx, dy) = trm.apply(0.0, 0.0);
                let (x, y) = self.top_down(dx, dy);
                self.glyphs.push(Glyph {
                    x,
                    y,
                    w: advance,
                    c,
                });
            }
            ts.tm = Matrix::translate(advance, 0.0).then(&ts.tm);
        }
    }

    fn flush_path(&mut self, path: &[PathOp], ctm: &Matrix) {
        let mut current: Option<(f64, f64)> = None;
        for op in path {
            match *op {
                PathOp::Move(x, y) => current = Some((x, y)),
                PathOp::Line(x, y) => {
                    if let Some((px, py)) = current {
                        let (ax, ay) = ctm.apply(px, py);
                        let (bx, by) = ctm.apply(x, y);
                        let (ax, ay) = self.top_down(ax, ay);
                        let (bx, by) = self.top_down(bx, by);
                        if (ay - by).abs() <= 0.5 && (ax - bx).abs() > 1.0 {
                            self.rules.push(ay.min(by));
                        }
                    }
                    current = Some((x, y));
                }
                PathOp::Rect(x, y, w, h) => {
                    let (ax, ay) = ctm.apply(x, y);
                    let (bx, by) = ctm.apply(x + w, y + h);
                    let (ax, ay) = self.top_down(ax, ay);
                    let (bx, by) = self.top_down(bx, by);
                    let region = Region {
                        x0: ax.min(bx),
                        top: ay.min(by),
                        x1: ax.max(bx),
                        bottom: ay.max(by),
                    };
                    if region.height() <= RULE_MAX_HEIGHT {
                        self.rules.push(region.top);
                    }
                    self.rects.push(region);
                }
            }
        }
    }
}

impl PageView for PdfPage {
    fn bounds(&self) -> Region {
        Region {
            x0: 0.0,
            top: 0.0,
            x1: self.width,
            bottom: self.height,
        }
    }

    fn rect_edges(&self) -> Vec<f64> {
        let mut edges = Vec::with_capacity(self.rects.len() * 2);
        for r in &self.rects {
            edges.push(r.top);
            edges.push(r.bottom);
        }
        edges
    }

    fn rule_tops(&self) -> Vec<f64> {
        let mut tops = self.rules.clone();
        tops.sort_by(|a, b| a.total_cmp(b));
        tops
    }

    fn text_within(&self, region: &Region) -> String {
        let mut inside: Vec<&Glyph> = self
            .glyphs
            .iter()
            .filter(|g| region.contains(g.x, g.y))
            .collect();
        inside.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

        let mut lines: Vec<String> = Vec::new();
        let mut line: Vec<&Glyph> = Vec::new();
        let mut baseline = f64::NEG_INFINITY;
        for glyph in inside {
            if line.is_empty() || glyph.y - baseline <= LINE_TOLERANCE {
                if line.is_empty() {
                    baseline = glyph.y;
                }
                line.push(glyph);
            } else {
                lines.push(render_line(&mut line));
                baseline = glyph.y;
                line.push(glyph);
            }
        }
        if !line.is_empty() {
            lines.push(render_line(&mut line));
        }
        lines.join("\n")
    }
}

fn render_line(glyphs: &mut Vec<&Glyph>) -> String {
    glyphs.sort_by(|a, b| a.x.total_cmp(&b.x));
    let mut text = String::new();
    let mut prev: Option<&Glyph> = None;
    for g in glyphs.drain(..) {
        if let Some(p) = prev {
            let gap = g.x - (p.x + p.w);
            if gap > p.w.max(1.0) * 0.5 && !text.ends_with(' ') {
                text.push(' ');
            }
        }
        text.push(g.c);
        prev = Some(g);
    }
    text
}

/// MediaBox with Pages-tree inheritance; letter-size fallback.
fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let mut id = page_id;
    for _ in 0..32 {
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        if let Ok(obj) = dict.get(b"MediaBox") {
            let resolved = match obj {
                Object::Reference(r) => doc.get_object(*r).ok(),
                other => Some(other),
            };
            if let Some(Object::Array(arr)) = resolved {
                if arr.len() == 4 {
                    return [
                        as_num(&arr[0]),
                        as_num(&arr[1]),
                        as_num(&arr[2]),
                        as_num(&arr[3]),
                    ];
                }
            }
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => id = parent,
            Err(_) => break,
        }
    }
    [0.0, 0.0, 612.0, 792.0]
}
