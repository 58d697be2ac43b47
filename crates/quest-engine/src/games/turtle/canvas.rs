//! Rasterizes turtle command logs so drawings can be compared pixel by pixel.

use resvg::tiny_skia::{Color, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};

use super::DrawCommand;

/// Side length of the square drawing surface.
pub const CANVAS_SIZE: u32 = 400;
/// Alpha difference above which two pixels count as different.
pub const ALPHA_THRESHOLD: u8 = 64;

/// Parses `#rgb` or `#rrggbb`.
pub fn parse_colour(src: &str) -> Option<Color> {
    let hex = src.strip_prefix('#').filter(|hex| hex.is_ascii())?;
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    let (r, g, b) = match hex.len() {
        3 => {
            let digit = |i: usize| channel(&hex[i..=i]).map(|v| v * 17);
            (digit(0)?, digit(1)?, digit(2)?)
        }
        6 => (channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?),
        _ => return None,
    };
    Some(Color::from_rgba8(r, g, b, 255))
}

/// Replays `commands` onto a transparent canvas. Each `Stroke` paints the
/// path built since the previous one with the current pen.
pub fn render(commands: &[DrawCommand]) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(CANVAS_SIZE, CANVAS_SIZE)?;
    let mut path = PathBuilder::new();
    let mut width = 1.0_f32;
    let mut colour = Color::WHITE;

    for command in commands {
        match command {
            DrawCommand::MoveTo { x, y } => path.move_to(*x as f32, *y as f32),
            DrawCommand::LineTo { x, y } => path.line_to(*x as f32, *y as f32),
            DrawCommand::PenWidth { width: w } if w.is_finite() && *w >= 0.0 => width = *w as f32,
            DrawCommand::PenWidth { width: w } => log::debug!("turtle: ignoring pen width {w}"),
            DrawCommand::PenColour { colour: c } => match parse_colour(c) {
                Some(parsed) => colour = parsed,
                None => log::debug!("turtle: ignoring colour {c:?}"),
            },
            DrawCommand::Stroke => {
                let pending = std::mem::replace(&mut path, PathBuilder::new());
                let Some(finished) = pending.finish() else {
                    continue;
                };
                let mut paint = Paint::default();
                paint.set_color(colour);
                paint.anti_alias = true;
                let stroke = Stroke {
                    width,
                    line_cap: LineCap::Round,
                    line_join: LineJoin::Round,
                    ..Stroke::default()
                };
                pixmap.stroke_path(&finished, &paint, &stroke, Transform::identity(), None);
            }
        }
    }
    Some(pixmap)
}

/// Number of pixels whose alpha differs by more than [`ALPHA_THRESHOLD`].
pub fn pixel_delta(user: &Pixmap, reference: &Pixmap) -> usize {
    user.data()
        .chunks_exact(4)
        .zip(reference.data().chunks_exact(4))
        .filter(|(a, b)| a[3].abs_diff(b[3]) > ALPHA_THRESHOLD)
        .count()
}

pub fn verify_solution(user: &Pixmap, reference: &Pixmap, tolerance: usize) -> bool {
    pixel_delta(user, reference) <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<DrawCommand> {
        vec![
            DrawCommand::PenWidth { width: 4.0 },
            DrawCommand::MoveTo { x: x0, y: y0 },
            DrawCommand::LineTo { x: x1, y: y1 },
            DrawCommand::Stroke,
        ]
    }

    #[test]
    fn colours_parse_short_and_long() {
        assert_eq!(parse_colour("#fff"), Some(Color::WHITE));
        assert_eq!(parse_colour("#ff0000"), Some(Color::from_rgba8(255, 0, 0, 255)));
        assert_eq!(parse_colour("red"), None);
        assert_eq!(parse_colour("#12345"), None);
    }

    #[test]
    fn non_ascii_colours_are_ignored() {
        assert_eq!(parse_colour("#é1"), None);
        assert_eq!(parse_colour("#ééé"), None);
        let log = [DrawCommand::PenColour { colour: "#é1".into() }];
        assert!(render(&log).is_some());
    }

    #[test]
    fn empty_log_is_transparent() {
        let pixmap = render(&[]).unwrap();
        assert_eq!(pixmap.width(), CANVAS_SIZE);
        assert!(pixmap.data().chunks_exact(4).all(|px| px[3] == 0));
    }

    #[test]
    fn strokes_cover_pixels() {
        let pixmap = render(&line(100.0, 200.0, 300.0, 200.0)).unwrap();
        let blank = render(&[]).unwrap();
        assert!(pixel_delta(&pixmap, &blank) > 400);
    }

    #[test]
    fn unstroked_paths_are_not_drawn() {
        let mut commands = line(100.0, 200.0, 300.0, 200.0);
        commands.pop();
        let blank = render(&[]).unwrap();
        assert_eq!(pixel_delta(&render(&commands).unwrap(), &blank), 0);
    }

    #[test]
    fn tolerance_bounds_the_difference() {
        let a = render(&line(100.0, 200.0, 300.0, 200.0)).unwrap();
        let b = render(&line(100.0, 200.0, 302.0, 200.0)).unwrap();
        let delta = pixel_delta(&a, &b);
        assert!(delta > 0);
        assert!(verify_solution(&a, &b, delta));
        assert!(!verify_solution(&a, &b, delta - 1));
        assert!(verify_solution(&a, &a, 0));
    }
}
