//! PDF rendering for [`ReportDocument`] via printpdf builtin fonts.
//!
//! Layout is a simple top-down cursor on A4 pages: each section writes
//! lines, and the writer starts a fresh page whenever the cursor would
//! cross the bottom margin.

use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rgb,
};

use pressgang_shared::{PressgangError, Result};

use crate::ReportDocument;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 20.0;
const MARGIN_RIGHT: f32 = 190.0;
const TOP_Y: f32 = 277.0;
const BOTTOM_Y: f32 = 20.0;

/// Characters per line at body size before wrapping.
const WRAP_WIDTH: usize = 95;

fn render_err(e: impl std::fmt::Display) -> PressgangError {
    PressgangError::Render(e.to_string())
}

fn gray() -> Color {
    Color::Rgb(Rgb::new(0.45, 0.45, 0.45, None))
}

fn navy() -> Color {
    Color::Rgb(Rgb::new(0.1, 0.15, 0.45, None))
}

fn red() -> Color {
    Color::Rgb(Rgb::new(0.65, 0.1, 0.1, None))
}

fn black() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None))
}

/// Render a report to PDF bytes.
pub fn render_pdf(report: &ReportDocument) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(
        &report.title,
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );

    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(render_err)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(render_err)?;

    let mut w = PageWriter {
        doc: &doc,
        layer: doc.get_page(page).get_layer(layer),
        y: TOP_Y,
    };

    // Header line and rule
    w.text(
        &format!(
            "AUDIT {}  |  STRICTLY CONFIDENTIAL  |  DATA SEALED: {}",
            report.audit_number, report.generated_on
        ),
        8.0,
        &regular,
        gray(),
        MARGIN_LEFT,
    );
    w.advance(2.0);
    w.rule();
    w.advance(6.0);

    w.text(&report.title, 16.0, &bold, navy(), MARGIN_LEFT);
    w.advance(10.0);

    // Disclaimer block
    w.section("LEGAL DISCLAIMER", &bold);
    for line in &report.disclaimer {
        w.wrapped(line, 8.0, &regular, red());
    }
    w.advance(4.0);

    // Requirements
    w.section("REQUIREMENTS", &bold);
    for req in &report.requirements {
        w.wrapped(&format!("- {req}"), 9.0, &regular, black());
    }
    w.advance(4.0);

    // Step-by-step roadmap
    w.section("OPERATIONAL ROADMAP", &bold);
    for (i, step) in report.steps.iter().enumerate() {
        w.wrapped(&format!("{}. {step}", i + 1), 9.0, &regular, black());
    }
    w.advance(4.0);

    // Cost projection table
    w.section("COST PROJECTION", &bold);
    w.row("Item", "Amount", "Note", 8.0, &bold, gray());
    w.advance(1.0);
    w.rule();
    w.advance(2.0);
    for cost in &report.costs {
        w.row(&cost.item, &cost.amount, &cost.note, 9.0, &regular, black());
    }
    w.advance(4.0);

    // 21-point checklist table
    w.section("AUDIT CHECKLIST", &bold);
    for (i, item) in report.checklist.iter().enumerate() {
        w.checklist_row(i + 1, item.label, item.status, &regular);
    }
    w.advance(4.0);

    // Evidence citations
    if !report.evidence.is_empty() {
        w.section("SOURCE EVIDENCE", &bold);
        for (i, ev) in report.evidence.iter().take(5).enumerate() {
            w.wrapped(&format!("E{}: {ev}", i + 1), 8.0, &regular, gray());
        }
        w.advance(4.0);
    }

    if let Some(source) = &report.source_line {
        w.wrapped(
            &format!("Verified site: {source} | {}", report.generated_on),
            8.0,
            &regular,
            gray(),
        );
        w.advance(6.0);
    }

    // Closing seal
    w.ensure(24.0);
    w.rule();
    w.advance(4.0);
    for line in &report.seal_lines {
        w.text(line, 9.0, &bold, navy(), 120.0);
        w.advance(5.0);
    }

    doc.save_to_bytes().map_err(render_err)
}

// ---------------------------------------------------------------------------
// Page writer
// ---------------------------------------------------------------------------

/// Top-down cursor over the current page layer.
struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl PageWriter<'_> {
    /// Start a new page if fewer than `needed` mm remain.
    fn ensure(&mut self, needed: f32) {
        if self.y - needed < BOTTOM_Y {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP_Y;
        }
    }

    fn advance(&mut self, mm: f32) {
        self.y -= mm;
    }

    /// Write a single line of text at the given x position.
    fn text(&mut self, text: &str, size: f32, font: &IndirectFontRef, color: Color, x: f32) {
        self.ensure(size * 0.6);
        self.layer.set_fill_color(color);
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
    }

    /// Write a line and advance the cursor by its leading.
    fn line(&mut self, text: &str, size: f32, font: &IndirectFontRef, color: Color) {
        self.text(text, size, font, color, MARGIN_LEFT);
        self.advance(size * 0.55);
    }

    /// Write word-wrapped body text.
    fn wrapped(&mut self, text: &str, size: f32, font: &IndirectFontRef, color: Color) {
        for piece in wrap_text(text, WRAP_WIDTH) {
            self.line(&piece, size, font, color.clone());
        }
    }

    /// Write a section header.
    fn section(&mut self, title: &str, bold: &IndirectFontRef) {
        self.ensure(14.0);
        self.text(title, 11.0, bold, navy(), MARGIN_LEFT);
        self.advance(6.0);
    }

    /// Write a three-column table row.
    fn row(
        &mut self,
        a: &str,
        b: &str,
        c: &str,
        size: f32,
        font: &IndirectFontRef,
        color: Color,
    ) {
        self.ensure(size * 0.6);
        self.layer.set_fill_color(color);
        self.layer.use_text(a, size, Mm(MARGIN_LEFT), Mm(self.y), font);
        self.layer.use_text(b, size, Mm(100.0), Mm(self.y), font);
        self.layer.use_text(c, size, Mm(140.0), Mm(self.y), font);
        self.advance(size * 0.55);
    }

    /// Write a numbered checklist row with its status in the right column.
    fn checklist_row(
        &mut self,
        n: usize,
        label: &str,
        status: &str,
        font: &IndirectFontRef,
    ) {
        self.ensure(5.0);
        self.layer.set_fill_color(black());
        self.layer
            .use_text(format!("{n:>2}. {label}"), 8.0, Mm(MARGIN_LEFT), Mm(self.y), font);
        self.layer
            .use_text(status, 8.0, Mm(165.0), Mm(self.y), font);
        self.advance(4.4);
    }

    /// Draw a horizontal rule across the text area.
    fn rule(&mut self) {
        self.ensure(2.0);
        self.layer.set_outline_color(gray());
        self.layer.set_outline_thickness(0.4);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN_LEFT), Mm(self.y)), false),
                (Point::new(Mm(MARGIN_RIGHT), Mm(self.y)), false),
            ],
            is_closed: false,
        });
    }
}

/// Greedy word wrap at `max_chars` per line.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
