//! UI rendering with ratatui.
//!
//! The wave scene fills the whole terminal as a braille canvas; the status
//! line is drawn afterwards so it sits on top of the backdrop.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::canvas::{Canvas, Circle, Context, Line as CanvasLine},
    widgets::Paragraph,
    Frame,
};

use super::surface::{Gradient, Scene, Shape, SurfaceSize};
use crate::app::App;

const PRIMARY_COLOR: Color = Color::Rgb(255, 184, 0);

/// Background the scene is screen-blended over.
pub const BACKGROUND: (u8, u8, u8) = (0, 0, 0);

pub fn render_ui(frame: &mut Frame, app: &App) {
    let area = frame.area();

    render_backdrop(frame, area, app.scene(), app.surface_size(), app.terminal_gain());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);
    render_status(frame, chunks[1], app);
}

/// Rasterize the recorded scene across `area`.
pub fn render_backdrop(frame: &mut Frame, area: Rect, scene: &Scene, size: SurfaceSize, gain: f64) {
    if size.is_empty() {
        return;
    }
    let width = f64::from(size.width);
    let height = f64::from(size.height);

    let canvas = Canvas::default()
        .marker(Marker::Braille)
        .background_color(rgb(BACKGROUND))
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(|ctx| {
            for shape in scene.shapes() {
                match shape {
                    Shape::Stroke {
                        points,
                        gradient,
                        line_width,
                    } => draw_stroke(ctx, points, gradient, *line_width, width, height, gain),
                    Shape::Dot {
                        x,
                        y,
                        radius,
                        color,
                    } => ctx.draw(&Circle {
                        x: *x,
                        y: height - *y,
                        radius: *radius,
                        color: rgb(color.screen_over(BACKGROUND, gain)),
                    }),
                }
            }
        });

    frame.render_widget(canvas, area);
}

/// Braille lines are one dot wide, so wider strokes repeat the polyline at
/// one-dot vertical offsets.
fn draw_stroke(
    ctx: &mut Context,
    points: &[(f64, f64)],
    gradient: &Gradient,
    line_width: f64,
    width: f64,
    height: f64,
    gain: f64,
) {
    let passes = line_width.round().max(1.0) as usize;
    for pass in 0..passes {
        let offset = pass as f64 - (passes - 1) as f64 / 2.0;
        for segment in points.windows(2) {
            let (x1, y1) = segment[0];
            let (x2, y2) = segment[1];
            let t = ((x1 + x2) / 2.0 / width).clamp(0.0, 1.0);
            let color = gradient.color_at(t).screen_over(BACKGROUND, gain);
            ctx.draw(&CanvasLine {
                x1,
                y1: height - y1 + offset,
                x2,
                y2: height - y2 + offset,
                color: rgb(color),
            });
        }
    }
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(r, g, b)
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let status_icon = if app.is_playing() { "▶" } else { "⏸" };

    let mut spans = vec![
        Span::styled(format!("  {} ", status_icon), Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(app.track_name(), Style::default().fg(Color::White)),
        Span::styled(format!("  {}", app.position_label()), Style::default().fg(Color::DarkGray)),
    ];

    if app.has_playback() {
        let volume_pct = (app.volume() * 100.0).round() as u32;
        let label = if app.is_muted() {
            "  Muted".to_string()
        } else {
            format!("  Vol: {}%", volume_pct)
        };
        spans.push(Span::styled(label, Style::default().fg(PRIMARY_COLOR)));
    }

    spans.extend([
        Span::styled(format!("  [{}]", app.analysis_label()), Style::default().fg(Color::DarkGray)),
        Span::styled("  │  ", Style::default().fg(Color::DarkGray)),
        Span::styled("[space]", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(" play/pause  ", Style::default().fg(Color::DarkGray)),
        Span::styled("[+/-]", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(" vol  ", Style::default().fg(Color::DarkGray)),
        Span::styled("[m]", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(" mute  ", Style::default().fg(Color::DarkGray)),
        Span::styled("[q]", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(" quit", Style::default().fg(Color::DarkGray)),
    ]);

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::surface::DrawContext;
    use crate::ui::waves::layer_gradient;
    use ratatui::{backend::TestBackend, Terminal};

    #[test]
    fn backdrop_paints_cells_along_the_wave() {
        let mut scene = Scene::default();
        let points: Vec<(f64, f64)> = (0..=40).map(|i| (f64::from(i) * 2.0, 40.0)).collect();
        scene.stroke_path(&points, &layer_gradient(0.15), 3.0);

        let mut terminal = Terminal::new(TestBackend::new(40, 20)).unwrap();
        terminal
            .draw(|f| {
                let area = f.area();
                render_backdrop(f, area, &scene, SurfaceSize::from_cells(40, 20), 4.0)
            })
            .unwrap();

        let cells = terminal.backend().buffer().content();
        let blank = |x: usize, y: usize| cells[y * 40 + x].symbol() == " ";
        let painted = (0..40).filter(|&x| !blank(x, 9) || !blank(x, 10)).count();
        assert!(painted > 30);
        assert!((0..40).all(|x| blank(x, 0) && blank(x, 19)));
    }

    #[test]
    fn empty_surface_draws_nothing() {
        let mut terminal = Terminal::new(TestBackend::new(10, 5)).unwrap();
        terminal
            .draw(|f| {
                let area = f.area();
                render_backdrop(f, area, &Scene::default(), SurfaceSize::default(), 1.0)
            })
            .unwrap();
        let buffer = terminal.backend().buffer();
        assert!(buffer.content().iter().all(|c| c.symbol() == " "));
    }
}
