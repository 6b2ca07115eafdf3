//! SVG rendering of the exploratory and result plots.

use crate::data::{DeResultSet, Regulation};
use crate::explore::distribution::BoxStats;
use crate::explore::pca::PcaResult;
use svg::node::element::{Circle, Line, Rectangle, Text};
use svg::Document;

const SVG_WIDTH: f64 = 760.0;
const SVG_HEIGHT: f64 = 520.0;
const PLOT_LEFT: f64 = 80.0;
const PLOT_RIGHT: f64 = 720.0;
const PLOT_TOP: f64 = 60.0;
const PLOT_BOTTOM: f64 = 440.0;

const PALETTE: [&str; 6] = ["#2563eb", "#dc2626", "#059669", "#d97706", "#7c3aed", "#0891b2"];
const GREY: &str = "#9ca3af";

/// Maps data coordinates onto the plot area.
#[derive(Debug, Clone, Copy)]
struct Axes {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Axes {
    fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        let pad = |lo: f64, hi: f64| {
            let span = if hi > lo { hi - lo } else { 1.0 };
            (lo - 0.05 * span, hi + 0.05 * span)
        };
        let (x_min, x_max) = pad(x_min, x_max);
        let (y_min, y_max) = pad(y_min, y_max);
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    fn x(&self, v: f64) -> f64 {
        PLOT_LEFT + (v - self.x_min) / (self.x_max - self.x_min) * (PLOT_RIGHT - PLOT_LEFT)
    }

    fn y(&self, v: f64) -> f64 {
        PLOT_BOTTOM - (v - self.y_min) / (self.y_max - self.y_min) * (PLOT_BOTTOM - PLOT_TOP)
    }
}

fn label(text: impl Into<String>, x: f64, y: f64, size: u32, anchor: &str) -> Text {
    Text::new(text.into())
        .set("x", x)
        .set("y", y)
        .set("text-anchor", anchor)
        .set("font-family", "sans-serif")
        .set("font-size", size)
        .set("fill", "#111827")
}

fn canvas(title: &str, x_label: &str, y_label: &str) -> Document {
    Document::new()
        .set("viewBox", (0, 0, SVG_WIDTH, SVG_HEIGHT))
        .set("width", SVG_WIDTH)
        .set("height", SVG_HEIGHT)
        .add(
            Rectangle::new()
                .set("x", 0)
                .set("y", 0)
                .set("width", SVG_WIDTH)
                .set("height", SVG_HEIGHT)
                .set("fill", "#ffffff"),
        )
        .add(
            Rectangle::new()
                .set("x", PLOT_LEFT)
                .set("y", PLOT_TOP)
                .set("width", PLOT_RIGHT - PLOT_LEFT)
                .set("height", PLOT_BOTTOM - PLOT_TOP)
                .set("fill", "none")
                .set("stroke", "#374151")
                .set("stroke-width", 1),
        )
        .add(label(title, SVG_WIDTH / 2.0, 32.0, 16, "middle"))
        .add(label(x_label, (PLOT_LEFT + PLOT_RIGHT) / 2.0, PLOT_BOTTOM + 44.0, 13, "middle"))
        .add(
            label(y_label, 0.0, 0.0, 13, "middle").set(
                "transform",
                format!("translate(24,{}) rotate(-90)", (PLOT_TOP + PLOT_BOTTOM) / 2.0),
            ),
        )
}

/// Round tick positions covering `[lo, hi]`.
fn ticks(lo: f64, hi: f64) -> Vec<f64> {
    let span = hi - lo;
    if span <= 0.0 || !span.is_finite() {
        return vec![lo];
    }
    let raw = span / 5.0;
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| span / s <= 6.0)
        .unwrap_or(10.0 * magnitude);
    let first = (lo / step).ceil() as i64;
    let last = (hi / step).floor() as i64;
    (first..=last).map(|k| k as f64 * step).collect()
}

fn format_tick(v: f64) -> String {
    if v.fract().abs() < 1e-9 {
        format!("{:.0}", v)
    } else {
        format!("{:.1}", v)
    }
}

fn with_axes(mut doc: Document, axes: &Axes, x_ticks: bool) -> Document {
    for t in ticks(axes.y_min, axes.y_max) {
        let y = axes.y(t);
        doc = doc
            .add(
                Line::new()
                    .set("x1", PLOT_LEFT - 5.0)
                    .set("y1", y)
                    .set("x2", PLOT_LEFT)
                    .set("y2", y)
                    .set("stroke", "#374151"),
            )
            .add(label(format_tick(t), PLOT_LEFT - 8.0, y + 4.0, 11, "end"));
    }
    if x_ticks {
        for t in ticks(axes.x_min, axes.x_max) {
            let x = axes.x(t);
            doc = doc
                .add(
                    Line::new()
                        .set("x1", x)
                        .set("y1", PLOT_BOTTOM)
                        .set("x2", x)
                        .set("y2", PLOT_BOTTOM + 5.0)
                        .set("stroke", "#374151"),
                )
                .add(label(format_tick(t), x, PLOT_BOTTOM + 18.0, 11, "middle"));
        }
    }
    doc
}

/// Distinct groups in first-seen order and the palette index of each sample.
fn group_colors(groups: &[String]) -> (Vec<String>, Vec<usize>) {
    let mut levels: Vec<String> = Vec::new();
    let idx = groups
        .iter()
        .map(|g| match levels.iter().position(|l| l == g) {
            Some(i) => i,
            None => {
                levels.push(g.clone());
                levels.len() - 1
            }
        })
        .collect();
    (levels, idx)
}

fn with_legend(mut doc: Document, levels: &[String]) -> Document {
    for (i, level) in levels.iter().enumerate() {
        let y = PLOT_TOP + 14.0 + 18.0 * i as f64;
        doc = doc
            .add(
                Circle::new()
                    .set("cx", PLOT_RIGHT - 110.0)
                    .set("cy", y - 4.0)
                    .set("r", 5)
                    .set("fill", PALETTE[i % PALETTE.len()]),
            )
            .add(label(level.clone(), PLOT_RIGHT - 98.0, y, 12, "start"));
    }
    doc
}

/// Per-sample box plot of log expression, boxes colored by group.
pub fn boxplot_svg(stats: &[BoxStats], groups: &[String], y_label: &str) -> String {
    let (levels, color_idx) = group_colors(groups);
    let y_min = stats.iter().map(|s| s.min).fold(f64::INFINITY, f64::min);
    let y_max = stats.iter().map(|s| s.max).fold(f64::NEG_INFINITY, f64::max);
    let axes = Axes::new(0.0, 1.0, y_min, y_max);

    let mut doc = canvas("Expression distribution per sample", "Sample", y_label);
    doc = with_axes(doc, &axes, false);

    let slot = (PLOT_RIGHT - PLOT_LEFT) / stats.len().max(1) as f64;
    let box_width = (slot * 0.6).min(40.0);
    for (j, s) in stats.iter().enumerate() {
        let cx = PLOT_LEFT + slot * (j as f64 + 0.5);
        let fill = color_idx
            .get(j)
            .map(|&i| PALETTE[i % PALETTE.len()])
            .unwrap_or(GREY);
        doc = doc
            .add(
                Line::new()
                    .set("x1", cx)
                    .set("y1", axes.y(s.lower_whisker))
                    .set("x2", cx)
                    .set("y2", axes.y(s.upper_whisker))
                    .set("stroke", "#374151"),
            )
            .add(
                Rectangle::new()
                    .set("x", cx - box_width / 2.0)
                    .set("y", axes.y(s.q3))
                    .set("width", box_width)
                    .set("height", (axes.y(s.q1) - axes.y(s.q3)).max(1.0))
                    .set("fill", fill)
                    .set("fill-opacity", 0.6)
                    .set("stroke", "#374151"),
            )
            .add(
                Line::new()
                    .set("x1", cx - box_width / 2.0)
                    .set("y1", axes.y(s.median))
                    .set("x2", cx + box_width / 2.0)
                    .set("y2", axes.y(s.median))
                    .set("stroke", "#111827")
                    .set("stroke-width", 2),
            )
            .add(
                label(s.sample_id.clone(), 0.0, 0.0, 10, "end").set(
                    "transform",
                    format!("translate({},{}) rotate(-45)", cx, PLOT_BOTTOM + 12.0),
                ),
            );
    }
    with_legend(doc, &levels).to_string()
}

/// PC1 vs PC2 scatter, points colored by group.
pub fn pca_svg(pca: &PcaResult, groups: &[String]) -> String {
    let (levels, color_idx) = group_colors(groups);
    let pc1 = pca.component(0);
    let pc2 = if pca.n_components() > 1 {
        pca.component(1)
    } else {
        vec![0.0; pc1.len()]
    };
    let var = |c: usize| 100.0 * pca.variance_explained.get(c).copied().unwrap_or(0.0);

    let min = |v: &[f64]| v.iter().copied().fold(f64::INFINITY, f64::min);
    let max = |v: &[f64]| v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let axes = Axes::new(min(&pc1), max(&pc1), min(&pc2), max(&pc2));

    let mut doc = canvas(
        "PCA of samples",
        &format!("PC1 ({:.1}% variance)", var(0)),
        &format!("PC2 ({:.1}% variance)", var(1)),
    );
    doc = with_axes(doc, &axes, true);

    for (s, (&x, &y)) in pc1.iter().zip(&pc2).enumerate() {
        let fill = color_idx
            .get(s)
            .map(|&i| PALETTE[i % PALETTE.len()])
            .unwrap_or(GREY);
        doc = doc.add(
            Circle::new()
                .set("cx", axes.x(x))
                .set("cy", axes.y(y))
                .set("r", 6)
                .set("fill", fill)
                .set("stroke", "#111827")
                .set("stroke-width", 0.5),
        );
    }
    with_legend(doc, &levels).to_string()
}

/// log2 fold change vs -log10 p-value; significant genes highlighted and
/// the top `n_labels` by p-value annotated with their symbol.
pub fn volcano_svg(results: &DeResultSet, alpha: f64, n_labels: usize) -> String {
    let neg_log_p = |p: f64| -(p.max(f64::MIN_POSITIVE)).log10();
    let x_max = results
        .iter()
        .map(|r| r.log_fc.abs())
        .fold(1.0, f64::max);
    let y_max = results
        .iter()
        .map(|r| neg_log_p(r.p_value))
        .fold(1.0, f64::max);
    let axes = Axes::new(-x_max, x_max, 0.0, y_max);

    let mut doc = canvas(
        &format!("Volcano plot: {}", results.coefficient),
        "log2 fold change",
        "-log10 p-value",
    );
    doc = with_axes(doc, &axes, true);
    doc = doc.add(
        Line::new()
            .set("x1", axes.x(0.0))
            .set("y1", PLOT_TOP)
            .set("x2", axes.x(0.0))
            .set("y2", PLOT_BOTTOM)
            .set("stroke", "#d1d5db")
            .set("stroke-dasharray", "4 4"),
    );

    // Non-significant first so highlighted points are drawn on top
    let mut ordered: Vec<_> = results.iter().collect();
    ordered.sort_by_key(|r| r.regulation(alpha) != Regulation::Unchanged);
    for r in ordered {
        let fill = match r.regulation(alpha) {
            Regulation::Up => PALETTE[1],
            Regulation::Down => PALETTE[0],
            Regulation::Unchanged => GREY,
        };
        doc = doc.add(
            Circle::new()
                .set("cx", axes.x(r.log_fc))
                .set("cy", axes.y(neg_log_p(r.p_value)))
                .set("r", 2.5)
                .set("fill", fill)
                .set("fill-opacity", 0.7),
        );
    }

    for r in results.sorted_by_pvalue().into_iter().take(n_labels) {
        if !r.is_significant_at(alpha) {
            break;
        }
        doc = doc.add(label(
            r.symbol.clone(),
            axes.x(r.log_fc) + 4.0,
            axes.y(neg_log_p(r.p_value)) - 4.0,
            10,
            "start",
        ));
    }

    let summary = results.summary(alpha);
    doc = doc.add(label(
        format!(
            "adj.P < {}: {} up, {} down",
            alpha, summary.up, summary.down
        ),
        PLOT_LEFT + 8.0,
        PLOT_TOP + 18.0,
        12,
        "start",
    ));
    doc.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DeResult;
    use nalgebra::DMatrix;

    #[test]
    fn test_ticks() {
        assert_eq!(ticks(0.0, 10.0), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
        assert_eq!(ticks(3.0, 3.0), vec![3.0]);
    }

    #[test]
    fn test_boxplot_svg() {
        let stats = vec![
            BoxStats {
                sample_id: "fetal_1".into(),
                min: 0.0,
                q1: 2.0,
                median: 4.0,
                q3: 6.0,
                max: 12.0,
                lower_whisker: 0.0,
                upper_whisker: 12.0,
                n_outliers: 0,
            },
            BoxStats {
                sample_id: "adult_1".into(),
                min: 1.0,
                q1: 3.0,
                median: 5.0,
                q3: 7.0,
                max: 11.0,
                lower_whisker: 1.0,
                upper_whisker: 11.0,
                n_outliers: 0,
            },
        ];
        let svg = boxplot_svg(&stats, &["fetal".into(), "adult".into()], "log2(count + 1)");
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("fetal_1"));
        assert!(svg.contains("adult"));
        assert!(svg.contains("log2(count + 1)"));
    }

    #[test]
    fn test_pca_svg_axis_labels() {
        let pca = PcaResult {
            sample_ids: vec!["a".into(), "b".into()],
            scores: DMatrix::from_row_slice(2, 1, &[1.0, -1.0]),
            sdev: vec![1.4],
            variance_explained: vec![1.0],
        };
        let svg = pca_svg(&pca, &["x".into(), "y".into()]);
        assert!(svg.contains("PC1 (100.0% variance)"));
        assert_eq!(svg.matches("<circle").count(), 2 + 2);
    }

    #[test]
    fn test_volcano_svg_labels_significant() {
        let mk = |id: &str, fc: f64, p: f64, q: f64| DeResult {
            gene_id: id.into(),
            symbol: format!("SYM_{}", id),
            log_fc: fc,
            ave_expr: 5.0,
            t: fc * 3.0,
            p_value: p,
            adj_p_value: q,
            b: 0.0,
        };
        let results = DeResultSet::new(
            "age_groupfetal".into(),
            vec![mk("1", 3.0, 1e-8, 1e-6), mk("2", -2.0, 1e-5, 1e-3), mk("3", 0.1, 0.8, 0.9)],
        );
        let svg = volcano_svg(&results, 0.05, 10);
        assert!(svg.contains("SYM_1"));
        assert!(svg.contains("SYM_2"));
        assert!(!svg.contains("SYM_3"));
        assert!(svg.contains("1 up, 1 down"));
    }
}
