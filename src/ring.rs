//! Circular/analog progress widget: a background ring, a foreground arc swept
//! clockwise from 12 o'clock, a centered percent label, and a status caption.

use eframe::egui::{self, Align2, Color32, FontId, Pos2, Sense, Shape, Stroke, Vec2};

const RING_COLOR: Color32 = Color32::from_rgb(0x45, 0x47, 0x5a);
const ARC_COLOR: Color32 = Color32::from_rgb(0xa6, 0xe3, 0xa1);
const TEXT_COLOR: Color32 = Color32::from_rgb(0xcd, 0xd6, 0xf4);
const CAPTION_COLOR: Color32 = Color32::from_rgb(0x89, 0xb4, 0xfa);
const STROKE_WIDTH: f32 = 12.0;
const WIDGET_SIZE: f32 = 200.0;
const ARC_SEGMENTS: usize = 96;

/// Clamps a percentage into [0, 100]; out-of-range values are clamped, never
/// rejected, and NaN renders as 0.
pub fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 100.0) }
}

/// Caption under the percent label: blank at 0, in-progress text below 100,
/// completion text at exactly 100.
pub fn caption(percent: f32) -> &'static str {
    let p = clamp_percent(percent);
    if p <= 0.0 {
        ""
    } else if p < 100.0 {
        "Downloading..."
    } else {
        "Complete!"
    }
}

/// Polyline approximating the arc for `fraction` of a full turn, starting at
/// 12 o'clock and sweeping clockwise. Screen y grows downward, so increasing
/// the angle from -90° traces clockwise on screen.
pub fn arc_points(center: Pos2, radius: f32, fraction: f32, segments: usize) -> Vec<Pos2> {
    let fraction = fraction.clamp(0.0, 1.0);
    let start = -std::f32::consts::FRAC_PI_2;
    let sweep = fraction * std::f32::consts::TAU;
    (0..=segments)
        .map(|i| {
            let angle = start + sweep * (i as f32 / segments as f32);
            Pos2::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
        })
        .collect()
}

/// Stateless widget; purely a function of the value passed each frame, and
/// idempotent to redraws.
pub struct CircularProgress {
    value: f32,
}

impl CircularProgress {
    pub fn new(percent: f32) -> Self {
        Self { value: clamp_percent(percent) }
    }
}

impl egui::Widget for CircularProgress {
    fn ui(self, ui: &mut egui::Ui) -> egui::Response {
        let (response, painter) = ui.allocate_painter(Vec2::splat(WIDGET_SIZE), Sense::hover());
        let center = response.rect.center();
        let radius = WIDGET_SIZE / 2.0 - 2.0 * STROKE_WIDTH;

        // Full background ring
        painter.circle_stroke(center, radius, Stroke::new(STROKE_WIDTH, RING_COLOR));

        // Foreground arc proportional to the value
        if self.value > 0.0 {
            let points = arc_points(center, radius, self.value / 100.0, ARC_SEGMENTS);
            painter.add(Shape::line(points, Stroke::new(STROKE_WIDTH, ARC_COLOR)));
        }

        painter.text(
            center,
            Align2::CENTER_CENTER,
            format!("{}%", self.value as u32),
            FontId::proportional(32.0),
            TEXT_COLOR,
        );

        let text = caption(self.value);
        if !text.is_empty() {
            let color = if self.value >= 100.0 { ARC_COLOR } else { CAPTION_COLOR };
            painter.text(
                Pos2::new(center.x, center.y + radius * 0.55),
                Align2::CENTER_CENTER,
                text,
                FontId::proportional(12.0),
                color,
            );
        }
        response
    }
}
