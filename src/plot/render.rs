//! Drawing of prepared [`Chart`]s with plotters.
//!
//! Everything is laid out in pixel space on the root drawing area. Raster
//! text is drawn with a bundled sans-serif face registered on first use.
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::FontStyle;
use tracing::debug;

use super::chart::{Chart, DotChart, EnrichmentChart, HeatmapChart, IouChart, WordCloudChart};
use crate::error::{GseaError, Result, ValidationError};

const FONT_FAMILY: &str = "sans-serif";
static FONT_DATA: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
static FONT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Register the bundled face for the raster glyph engine, once per process.
fn ensure_font() -> Result<()> {
    FONT.get_or_init(|| {
        plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, FONT_DATA)
            .map_err(|_| "bundled font could not be parsed".to_string())
    })
    .clone()
    .map_err(GseaError::Render)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
        }
    }

    pub fn is_vector(self) -> bool {
        self == ImageFormat::Svg
    }
}

impl FromStr for ImageFormat {
    type Err = ValidationError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "svg" => Ok(ImageFormat::Svg),
            other => Err(ValidationError::MalformedArgument(format!(
                "unsupported image format '{other}' (expected png or svg)"
            ))),
        }
    }
}

/// Draws one chart into one file.
pub trait Renderer {
    fn render(&self, chart: &Chart, size: (u32, u32), format: ImageFormat, path: &Path) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlottersRenderer;

impl Renderer for PlottersRenderer {
    fn render(&self, chart: &Chart, size: (u32, u32), format: ImageFormat, path: &Path) -> Result<()> {
        match format {
            ImageFormat::Png => {
                ensure_font()?;
                let root = BitMapBackend::new(path, size).into_drawing_area();
                paint(&root, chart)?;
                root.present().map_err(draw_err)?;
            }
            ImageFormat::Svg => {
                let root = SVGBackend::new(path, size).into_drawing_area();
                paint(&root, chart)?;
                root.present().map_err(draw_err)?;
            }
        }
        debug!(path = %path.display(), width = size.0, height = size.1, "chart drawn");
        Ok(())
    }
}

fn draw_err<E: std::fmt::Display>(e: E) -> GseaError {
    GseaError::Render(e.to_string())
}

fn paint<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, chart: &Chart) -> Result<()> {
    root.fill(&WHITE).map_err(draw_err)?;
    let (w, h) = root.dim_in_pixel();
    let canvas = Canvas {
        root,
        w: w as i32,
        h: h as i32,
    };
    match chart {
        Chart::Enrichment(c) if c.is_overlay() => canvas.enrichment_overlay(c),
        Chart::Enrichment(c) => canvas.enrichment_single(c),
        Chart::Dot(c) => canvas.dotplot(c),
        Chart::Heatmap(c) => canvas.heatmap(c),
        Chart::Iou(c) => canvas.iou(c),
        Chart::WordCloud(c) => canvas.wordcloud(c),
    }
}

const TAB10: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];
const RES_GREEN: RGBColor = RGBColor(136, 197, 68);
const GRID: RGBColor = RGBColor(200, 200, 200);

fn lerp(a: RGBColor, b: RGBColor, t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// blue - white - red, `t` in [-1, 1]
fn diverging(t: f64) -> RGBColor {
    let blue = RGBColor(59, 76, 192);
    let red = RGBColor(180, 4, 38);
    if t < 0.0 {
        lerp(WHITE, blue, -t)
    } else {
        lerp(WHITE, red, t)
    }
}

/// white - dark blue, `t` in [0, 1]
fn sequential(t: f64) -> RGBColor {
    lerp(RGBColor(247, 251, 255), RGBColor(8, 48, 107), t)
}

/// red - purple - blue, `t` in [0, 1]
fn dot_gradient(t: f64) -> RGBColor {
    let (red, purple, blue) = (RGBColor(215, 48, 39), RGBColor(117, 80, 160), RGBColor(49, 54, 149));
    if t < 0.5 {
        lerp(blue, purple, t * 2.0)
    } else {
        lerp(purple, red, (t - 0.5) * 2.0)
    }
}

fn finite_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

fn padded(lo: f64, hi: f64) -> (f64, f64) {
    let span = hi - lo;
    if span <= f64::EPSILON {
        (lo - 1.0, hi + 1.0)
    } else {
        (lo - 0.05 * span, hi + 0.05 * span)
    }
}

/// Rectangle in pixel space with data -> pixel mapping.
#[derive(Debug, Clone, Copy)]
struct Frame {
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
}

impl Frame {
    fn x(&self, v: f64, lo: f64, hi: f64) -> i32 {
        let t = if hi > lo { (v - lo) / (hi - lo) } else { 0.5 };
        self.x0 + (t * (self.x1 - self.x0) as f64).round() as i32
    }
    fn y(&self, v: f64, lo: f64, hi: f64) -> i32 {
        let t = if hi > lo { (v - lo) / (hi - lo) } else { 0.5 };
        self.y1 - (t * (self.y1 - self.y0) as f64).round() as i32
    }
}

struct Canvas<'a, DB: DrawingBackend> {
    root: &'a DrawingArea<DB, Shift>,
    w: i32,
    h: i32,
}

impl<'a, DB: DrawingBackend> Canvas<'a, DB> {
    fn px(&self, fx: f64) -> i32 {
        (self.w as f64 * fx).round() as i32
    }
    fn py(&self, fy: f64) -> i32 {
        (self.h as f64 * fy).round() as i32
    }
    /// font size as a fraction of the shorter canvas side
    fn font(&self, frac: f64) -> f64 {
        (self.w.min(self.h) as f64 * frac).max(6.0)
    }
    fn line_width(&self) -> u32 {
        ((self.w.min(self.h) as f64 / 400.0).round() as u32).max(1)
    }

    fn text(&self, s: &str, at: (i32, i32), size: f64, color: RGBColor, anchor: (HPos, VPos)) -> Result<()> {
        if s.is_empty() {
            return Ok(());
        }
        let style = (FONT_FAMILY, size)
            .into_font()
            .color(&color)
            .pos(Pos::new(anchor.0, anchor.1));
        self.root
            .draw(&Text::new(s.to_string(), at, style))
            .map_err(draw_err)
    }

    fn rect(&self, a: (i32, i32), b: (i32, i32), style: ShapeStyle) -> Result<()> {
        self.root.draw(&Rectangle::new([a, b], style)).map_err(draw_err)
    }

    fn path(&self, points: Vec<(i32, i32)>, style: ShapeStyle) -> Result<()> {
        self.root.draw(&PathElement::new(points, style)).map_err(draw_err)
    }

    fn border(&self, f: &Frame) -> Result<()> {
        self.rect((f.x0, f.y0), (f.x1, f.y1), BLACK.stroke_width(self.line_width()))
    }

    /// tick labels at both ends and zero, left of the frame
    fn y_ticks(&self, f: &Frame, lo: f64, hi: f64) -> Result<()> {
        let size = self.font(0.022);
        let mut ticks = vec![lo, hi];
        if lo < 0.0 && hi > 0.0 {
            ticks.push(0.0);
        }
        for v in ticks {
            let y = f.y(v, lo, hi);
            self.path(vec![(f.x0 - 5, y), (f.x0, y)], BLACK.stroke_width(1))?;
            self.text(&format!("{v:.2}"), (f.x0 - 8, y), size, BLACK, (HPos::Right, VPos::Center))?;
        }
        Ok(())
    }

    fn x_ticks(&self, f: &Frame, lo: f64, hi: f64, n: usize) -> Result<()> {
        let size = self.font(0.022);
        for k in 0..=n {
            let v = lo + (hi - lo) * k as f64 / n as f64;
            let x = f.x(v, lo, hi);
            self.path(vec![(x, f.y1), (x, f.y1 + 5)], BLACK.stroke_width(1))?;
            let label = if (hi - lo).abs() >= 100.0 {
                format!("{v:.0}")
            } else {
                format!("{v:.2}")
            };
            self.text(&label, (x, f.y1 + 8), size, BLACK, (HPos::Center, VPos::Top))?;
        }
        Ok(())
    }

    fn res_curve(&self, f: &Frame, res: &[f64], lo: f64, hi: f64, color: RGBColor) -> Result<()> {
        let n = res.len().max(2) as f64 - 1.0;
        let points: Vec<(i32, i32)> = res
            .iter()
            .enumerate()
            .map(|(i, &v)| (f.x(i as f64, 0.0, n), f.y(v, lo, hi)))
            .collect();
        self.path(points, color.stroke_width(self.line_width() * 2))
    }

    fn zero_line(&self, f: &Frame, lo: f64, hi: f64) -> Result<()> {
        let y = f.y(0.0, lo, hi);
        self.path(vec![(f.x0, y), (f.x1, y)], GRID.stroke_width(self.line_width()))
    }

    fn hit_marks(&self, f: &Frame, hits: &[usize], n: usize, color: RGBColor) -> Result<()> {
        let last = n.max(2) as f64 - 1.0;
        for &h in hits {
            let x = f.x(h as f64, 0.0, last);
            self.path(vec![(x, f.y0), (x, f.y1)], color.stroke_width(self.line_width()))?;
        }
        Ok(())
    }

    fn rank_metric_panel(&self, f: &Frame, metric: &[f64]) -> Result<()> {
        let (lo, hi) = finite_range(metric.iter().copied()).unwrap_or((-1.0, 1.0));
        let (lo, hi) = padded(lo.min(0.0), hi.max(0.0));
        let last = metric.len().max(2) as f64 - 1.0;
        let zero = f.y(0.0, lo, hi);
        let mut points = vec![(f.x0, zero)];
        points.extend(metric.iter().enumerate().map(|(i, &v)| {
            let v = if v.is_finite() { v } else { 0.0 };
            (f.x(i as f64, 0.0, last), f.y(v, lo, hi))
        }));
        points.push((f.x1, zero));
        self.root
            .draw(&Polygon::new(points, RGBColor(160, 160, 160).filled()))
            .map_err(draw_err)?;
        self.zero_line(f, lo, hi)?;
        self.y_ticks(f, lo, hi)?;
        self.border(f)?;
        self.text(
            "Ranked list metric",
            (f.x0 + 6, f.y0 + 4),
            self.font(0.022),
            BLACK,
            (HPos::Left, VPos::Top),
        )
    }

    fn enrichment_single(&self, c: &EnrichmentChart) -> Result<()> {
        let Some(t) = c.traces.first() else {
            return Ok(());
        };
        let n = t.res.len();
        self.text(&t.term, (self.px(0.5), self.py(0.02)), self.font(0.035), BLACK, (HPos::Center, VPos::Top))?;
        let stats = format!("NES: {:.3}   Pval: {:.3e}   FDR: {:.3e}", t.nes, t.pval, t.fdr);
        self.text(&stats, (self.px(0.5), self.py(0.075)), self.font(0.025), BLACK, (HPos::Center, VPos::Top))?;

        let (x0, x1) = (self.px(0.14), self.px(0.95));
        let res_f = Frame { x0, x1, y0: self.py(0.13), y1: self.py(0.55) };
        let hit_f = Frame { x0, x1, y0: self.py(0.56), y1: self.py(0.63) };
        let rank_f = Frame { x0, x1, y0: self.py(0.64), y1: self.py(0.88) };

        let (lo, hi) = finite_range(t.res.iter().copied()).unwrap_or((0.0, 0.0));
        let (lo, hi) = padded(lo.min(0.0), hi.max(0.0));
        self.zero_line(&res_f, lo, hi)?;
        self.res_curve(&res_f, &t.res, lo, hi, RES_GREEN)?;
        self.y_ticks(&res_f, lo, hi)?;
        self.border(&res_f)?;
        self.text("Enrichment Score", (res_f.x0 + 6, res_f.y0 + 4), self.font(0.022), BLACK, (HPos::Left, VPos::Top))?;

        self.hit_marks(&hit_f, &t.hits, n, BLACK)?;
        self.border(&hit_f)?;

        self.rank_metric_panel(&rank_f, &c.rank_metric)?;
        self.x_ticks(&rank_f, 0.0, n.saturating_sub(1) as f64, 4)?;
        self.text("Gene Rank", (self.px(0.55), self.py(0.96)), self.font(0.025), BLACK, (HPos::Center, VPos::Center))
    }

    fn enrichment_overlay(&self, c: &EnrichmentChart) -> Result<()> {
        let n = c.traces.iter().map(|t| t.res.len()).max().unwrap_or(0);
        let (x0, x1) = (self.px(0.1), self.px(0.68));
        let res_f = Frame { x0, x1, y0: self.py(0.06), y1: self.py(0.6) };
        let (lo, hi) = finite_range(c.traces.iter().flat_map(|t| t.res.iter().copied()))
            .unwrap_or((0.0, 0.0));
        let (lo, hi) = padded(lo.min(0.0), hi.max(0.0));
        self.zero_line(&res_f, lo, hi)?;
        for (i, t) in c.traces.iter().enumerate() {
            self.res_curve(&res_f, &t.res, lo, hi, TAB10[i % TAB10.len()])?;
        }
        self.y_ticks(&res_f, lo, hi)?;
        self.border(&res_f)?;
        self.text("Enrichment Score", (res_f.x0 + 6, res_f.y0 + 4), self.font(0.022), BLACK, (HPos::Left, VPos::Top))?;

        // one barcode row per term
        let (top, bottom) = (self.py(0.62), self.py(0.9));
        let band = ((bottom - top) / c.traces.len() as i32).max(2);
        for (i, t) in c.traces.iter().enumerate() {
            let f = Frame { x0, x1, y0: top + band * i as i32, y1: top + band * (i as i32 + 1) - 1 };
            self.hit_marks(&f, &t.hits, n, TAB10[i % TAB10.len()])?;
        }
        let frame = Frame { x0, x1, y0: top, y1: top + band * c.traces.len() as i32 };
        self.border(&frame)?;
        self.x_ticks(&frame, 0.0, n.saturating_sub(1) as f64, 4)?;
        self.text("Gene Rank", ((x0 + x1) / 2, self.py(0.97)), self.font(0.025), BLACK, (HPos::Center, VPos::Center))?;

        // legend
        let size = self.font(0.022);
        let step = (size * 1.6).round() as i32;
        for (i, t) in c.traces.iter().enumerate() {
            let y = res_f.y0 + step * i as i32 + step / 2;
            let lx = self.px(0.7);
            self.path(vec![(lx, y), (lx + step, y)], TAB10[i % TAB10.len()].stroke_width(self.line_width() * 3))?;
            self.text(&t.term, (lx + step + 6, y), size, BLACK, (HPos::Left, VPos::Center))?;
        }
        Ok(())
    }

    fn dotplot(&self, c: &DotChart) -> Result<()> {
        self.text(&c.title, (self.px(0.5), self.py(0.02)), self.font(0.035), BLACK, (HPos::Center, VPos::Top))?;
        let f = Frame { x0: self.px(0.38), x1: self.px(0.8), y0: self.py(0.1), y1: self.py(0.88) };
        let (lo, hi) = finite_range(c.rows.iter().map(|r| r.nes)).unwrap_or((-1.0, 1.0));
        let (lo, hi) = padded(lo, hi);
        self.border(&f)?;
        self.x_ticks(&f, lo, hi, 4)?;
        self.text("NES", ((f.x0 + f.x1) / 2, self.py(0.96)), self.font(0.025), BLACK, (HPos::Center, VPos::Center))?;
        if c.rows.is_empty() {
            return Ok(());
        }

        let band = (f.y1 - f.y0) as f64 / c.rows.len() as f64;
        let r_max = (band / 2.0 - 1.0).min(self.w as f64 * 0.03).max(2.0);
        let r_min = (r_max * 0.25).max(1.0);
        let (c_lo, c_hi) = finite_range(c.rows.iter().map(|r| r.color)).unwrap_or((0.0, 1.0));
        let label_size = self.font(0.022).min(band * 0.8).max(6.0);
        for (i, row) in c.rows.iter().enumerate() {
            let y = f.y0 + ((i as f64 + 0.5) * band).round() as i32;
            self.path(vec![(f.x0, y), (f.x1, y)], GRID.stroke_width(1))?;
            self.text(&row.term, (f.x0 - 8, y), label_size, BLACK, (HPos::Right, VPos::Center))?;
            if !row.nes.is_finite() {
                continue;
            }
            let t = if c_hi > c_lo { (row.color - c_lo) / (c_hi - c_lo) } else { 1.0 };
            let radius = r_min + (r_max - r_min) * row.gene_ratio.clamp(0.0, 1.0);
            self.root
                .draw(&Circle::new((f.x(row.nes, lo, hi), y), radius, dot_gradient(t).filled()))
                .map_err(draw_err)?;
            self.root
                .draw(&Circle::new((f.x(row.nes, lo, hi), y), radius, BLACK.stroke_width(1)))
                .map_err(draw_err)?;
        }

        // colour bar
        let bar = Frame { x0: self.px(0.85), x1: self.px(0.88), y0: self.py(0.3), y1: self.py(0.7) };
        let steps = 50;
        for k in 0..steps {
            let ya = bar.y1 - (bar.y1 - bar.y0) * k / steps;
            let yb = bar.y1 - (bar.y1 - bar.y0) * (k + 1) / steps;
            self.rect((bar.x0, yb), (bar.x1, ya), dot_gradient(k as f64 / (steps - 1) as f64).filled())?;
        }
        self.border(&bar)?;
        let size = self.font(0.02);
        let legend = if c.column.is_probability() {
            format!("-log10({})", c.column.name())
        } else {
            c.column.name().to_string()
        };
        self.text(&legend, ((bar.x0 + bar.x1) / 2, bar.y0 - 10), size, BLACK, (HPos::Center, VPos::Bottom))?;
        self.text(&format!("{c_hi:.2}"), (bar.x1 + 6, bar.y0), size, BLACK, (HPos::Left, VPos::Center))?;
        self.text(&format!("{c_lo:.2}"), (bar.x1 + 6, bar.y1), size, BLACK, (HPos::Left, VPos::Center))
    }

    fn heatmap(&self, c: &HeatmapChart) -> Result<()> {
        self.text(&c.title, (self.px(0.5), self.py(0.02)), self.font(0.035), BLACK, (HPos::Center, VPos::Top))?;
        let f = Frame { x0: self.px(0.22), x1: self.px(0.85), y0: self.py(0.1), y1: self.py(0.85) };
        let (n_rows, n_cols) = (c.genes.len().max(1), c.samples.len().max(1));
        let cw = (f.x1 - f.x0) as f64 / n_cols as f64;
        let ch = (f.y1 - f.y0) as f64 / n_rows as f64;
        let vmax = finite_range(c.z.iter().flatten().map(|v| v.abs()))
            .map(|(_, hi)| hi)
            .filter(|&v| v > 0.0)
            .unwrap_or(1.0);
        for (i, row) in c.z.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                let a = (f.x0 + (j as f64 * cw) as i32, f.y0 + (i as f64 * ch) as i32);
                let b = (f.x0 + ((j + 1) as f64 * cw) as i32, f.y0 + ((i + 1) as f64 * ch) as i32);
                let v = if v.is_finite() { v } else { 0.0 };
                self.rect(a, b, diverging(v / vmax).filled())?;
            }
        }
        self.border(&f)?;
        let size = self.font(0.02).min(ch * 0.9).max(6.0);
        for (i, g) in c.genes.iter().enumerate() {
            let y = f.y0 + ((i as f64 + 0.5) * ch) as i32;
            self.text(g, (f.x0 - 6, y), size, BLACK, (HPos::Right, VPos::Center))?;
        }
        let size = self.font(0.02).min(cw * 0.9).max(6.0);
        for (j, s) in c.samples.iter().enumerate() {
            let x = f.x0 + ((j as f64 + 0.5) * cw) as i32;
            self.text(s, (x, f.y1 + 6), size, BLACK, (HPos::Center, VPos::Top))?;
        }

        let bar = Frame { x0: self.px(0.89), x1: self.px(0.92), y0: self.py(0.3), y1: self.py(0.7) };
        let steps = 50;
        for k in 0..steps {
            let ya = bar.y1 - (bar.y1 - bar.y0) * k / steps;
            let yb = bar.y1 - (bar.y1 - bar.y0) * (k + 1) / steps;
            let t = -1.0 + 2.0 * k as f64 / (steps - 1) as f64;
            self.rect((bar.x0, yb), (bar.x1, ya), diverging(t).filled())?;
        }
        self.border(&bar)?;
        let size = self.font(0.02);
        self.text(&format!("{vmax:.2}"), (bar.x1 + 6, bar.y0), size, BLACK, (HPos::Left, VPos::Center))?;
        self.text(&format!("{:.2}", -vmax), (bar.x1 + 6, bar.y1), size, BLACK, (HPos::Left, VPos::Center))?;
        self.text("z-score", ((bar.x0 + bar.x1) / 2, bar.y0 - 10), size, BLACK, (HPos::Center, VPos::Bottom))
    }

    fn iou(&self, c: &IouChart) -> Result<()> {
        let n = c.labels.len().max(1);
        let side = self.px(0.6).min(self.py(0.78));
        let f = Frame { x0: self.px(0.08), y0: self.py(0.1), x1: self.px(0.08) + side, y1: self.py(0.1) + side };
        let cell = side as f64 / n as f64;
        self.text("Intersection over union", (self.px(0.5), self.py(0.02)), self.font(0.035), BLACK, (HPos::Center, VPos::Top))?;
        let value_size = (cell * 0.3).min(self.font(0.025));
        for (i, row) in c.matrix.iter().enumerate() {
            // strict upper triangle stays blank
            for (j, &v) in row.iter().enumerate().take(i + 1) {
                let a = (f.x0 + (j as f64 * cell) as i32, f.y0 + (i as f64 * cell) as i32);
                let b = (f.x0 + ((j + 1) as f64 * cell) as i32, f.y0 + ((i + 1) as f64 * cell) as i32);
                self.rect(a, b, sequential(v).filled())?;
                self.rect(a, b, WHITE.stroke_width(1))?;
                if value_size >= 6.0 {
                    let ink = if v > 0.5 { WHITE } else { BLACK };
                    self.text(&format!("{v:.2}"), ((a.0 + b.0) / 2, (a.1 + b.1) / 2), value_size, ink, (HPos::Center, VPos::Center))?;
                }
            }
        }
        let size = self.font(0.022).min(cell * 0.8).max(6.0);
        for (i, label) in c.labels.iter().enumerate() {
            let mid = (i as f64 * cell + cell / 2.0) as i32;
            self.text(label, (f.x0 - 6, f.y0 + mid), size, BLACK, (HPos::Right, VPos::Center))?;
            self.text(label, (f.x0 + mid, f.y1 + 6), size, BLACK, (HPos::Center, VPos::Top))?;
        }
        let size = self.font(0.02);
        let step = (size * 1.5).round() as i32;
        for (i, (label, term)) in c.labels.iter().zip(&c.terms).enumerate() {
            let y = f.y0 + step * i as i32;
            self.text(&format!("{label}: {term}"), (f.x1 + self.px(0.04), y), size, BLACK, (HPos::Left, VPos::Top))?;
        }
        Ok(())
    }

    fn wordcloud(&self, c: &WordCloudChart) -> Result<()> {
        let placed = layout_words(&c.words, self.w as f64, self.h as f64);
        for (i, p) in placed.iter().enumerate() {
            self.text(
                &p.word,
                (p.x.round() as i32, p.y.round() as i32),
                p.size,
                TAB10[i % TAB10.len()],
                (HPos::Center, VPos::Center),
            )?;
        }
        Ok(())
    }
}

/// Word placed on the cloud canvas, centred at (x, y).
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedWord {
    pub word: String,
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

impl PlacedWord {
    /// approximate glyph box: 0.6 em per character, 1 em tall
    fn extent(&self) -> (f64, f64, f64, f64) {
        let half_w = 0.3 * self.size * self.word.chars().count() as f64;
        let half_h = 0.5 * self.size;
        (self.x - half_w, self.y - half_h, self.x + half_w, self.y + half_h)
    }

    fn overlaps(&self, other: &PlacedWord) -> bool {
        let (a0, b0, a1, b1) = self.extent();
        let (c0, d0, c1, d1) = other.extent();
        a0 < c1 && c0 < a1 && b0 < d1 && d0 < b1
    }
}

/// Spiral layout: words in frequency order, each placed at the first spot
/// along an Archimedean spiral from the centre where it fits the canvas
/// without overlapping earlier words. Words that never fit are left out.
pub fn layout_words(words: &[(String, usize)], width: f64, height: f64) -> Vec<PlacedWord> {
    let max_count = words.iter().map(|(_, n)| *n).max().unwrap_or(0);
    if max_count == 0 {
        return Vec::new();
    }
    let (cx, cy) = (width / 2.0, height / 2.0);
    let max_size = height.min(width) / 6.0;
    let min_size = (height.min(width) / 60.0).max(8.0).min(max_size);
    let step = (width.min(height) / 400.0).max(0.5);
    let limit = (cx * cx + cy * cy).sqrt();

    let mut placed: Vec<PlacedWord> = Vec::new();
    for (word, count) in words {
        let chars = word.chars().count().max(1) as f64;
        let size = (min_size + (max_size - min_size) * *count as f64 / max_count as f64)
            .min(0.95 * width / (0.6 * chars));
        if size < 1.0 {
            continue;
        }
        let mut theta: f64 = 0.0;
        loop {
            let r = step * theta;
            if r > limit {
                debug!(word = %word, "no room left for word");
                break;
            }
            let cand = PlacedWord {
                word: word.clone(),
                x: cx + r * theta.cos(),
                y: cy + r * theta.sin(),
                size,
            };
            let (x0, y0, x1, y1) = cand.extent();
            if x0 >= 0.0 && y0 >= 0.0 && x1 <= width && y1 <= height && !placed.iter().any(|p| p.overlaps(&cand)) {
                placed.push(cand);
                break;
            }
            theta += 0.1;
        }
    }
    placed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats() {
        assert_eq!("png".parse::<ImageFormat>().unwrap(), ImageFormat::Png);
        assert_eq!(".SVG".parse::<ImageFormat>().unwrap(), ImageFormat::Svg);
        assert!("pdf".parse::<ImageFormat>().is_err());
        assert!(ImageFormat::Svg.is_vector());
    }

    #[test]
    fn word_layout_has_no_overlaps() {
        let words: Vec<(String, usize)> = (0..60)
            .map(|i| (format!("word{i}"), 60 - i))
            .collect();
        let placed = layout_words(&words, 800.0, 600.0);
        assert!(!placed.is_empty());
        assert_eq!(placed[0].word, "word0");
        assert!((placed[0].x - 400.0).abs() < 1e-9);
        for (i, a) in placed.iter().enumerate() {
            let (x0, y0, x1, y1) = a.extent();
            assert!(x0 >= 0.0 && y0 >= 0.0 && x1 <= 800.0 && y1 <= 600.0);
            for b in &placed[i + 1..] {
                assert!(!a.overlaps(b), "{} overlaps {}", a.word, b.word);
            }
        }
        // larger counts never get smaller fonts
        for w in placed.windows(2) {
            assert!(w[0].size >= w[1].size);
        }
    }

    #[test]
    fn colour_maps_stay_in_range() {
        assert_eq!(diverging(0.0), WHITE);
        assert_eq!(diverging(1.0), RGBColor(180, 4, 38));
        assert_eq!(lerp(BLACK, WHITE, f64::NAN), BLACK);
        assert_eq!(sequential(2.0), RGBColor(8, 48, 107));
    }

    fn sample_charts() -> Vec<Chart> {
        use super::super::chart::*;
        use super::super::request::StatColumn;
        vec![
            Chart::Enrichment(EnrichmentChart {
                traces: vec![EnrichmentTrace {
                    term: "T".into(),
                    nes: 1.5,
                    pval: 0.01,
                    fdr: 0.02,
                    res: vec![0.2, 0.5, 0.3, 0.0],
                    hits: vec![0, 1],
                }],
                rank_metric: vec![2.0, 1.0, -1.0, -2.0],
            }),
            Chart::Dot(DotChart {
                title: "NES dotplot".into(),
                column: StatColumn::Nes,
                rows: vec![],
            }),
            Chart::Heatmap(HeatmapChart {
                title: "T".into(),
                genes: vec!["A".into()],
                samples: vec!["S1".into(), "S2".into()],
                z: vec![vec![-0.7, 0.7]],
            }),
            Chart::Iou(IouChart {
                labels: vec!["G0".into(), "G1".into()],
                terms: vec!["T1".into(), "T2".into()],
                matrix: vec![vec![1.0, 0.5], vec![0.5, 1.0]],
            }),
            Chart::WordCloud(WordCloudChart {
                words: vec![("KRAS".into(), 3), ("TP53".into(), 2), ("MYC".into(), 1)],
            }),
        ]
    }

    #[test]
    fn svg_export_of_every_chart_kind() {
        let dir = tempfile::tempdir().unwrap();
        for (i, chart) in sample_charts().iter().enumerate() {
            let path = dir.path().join(format!("c{i}.svg"));
            PlottersRenderer
                .render(chart, (300, 200), ImageFormat::Svg, &path)
                .unwrap();
            let svg = std::fs::read_to_string(&path).unwrap();
            assert!(svg.contains("<svg"));
        }
    }

    #[test]
    fn png_export_of_every_chart_kind() {
        let dir = tempfile::tempdir().unwrap();
        for (i, chart) in sample_charts().iter().enumerate() {
            let path = dir.path().join(format!("c{i}.png"));
            PlottersRenderer
                .render(chart, (300, 200), ImageFormat::Png, &path)
                .unwrap();
            let bytes = std::fs::read(&path).unwrap();
            assert_eq!(&bytes[..4], b"\x89PNG");
        }
    }

    #[test]
    fn raster_text_leaves_ink() {
        ensure_font().unwrap();
        let (w, h) = (200u32, 100u32);
        let mut buf = vec![0u8; (w * h * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut buf, (w, h)).into_drawing_area();
            let chart = Chart::WordCloud(WordCloudChart {
                words: vec![("GENE".into(), 3)],
            });
            paint(&root, &chart).unwrap();
            root.present().unwrap();
        }
        // a word cloud draws nothing but glyphs on a white canvas
        assert!(buf.iter().any(|&b| b != 255));
    }
}
