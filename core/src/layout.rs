use crate::geometry::{FramePoint, GridBounds, Point, ReferenceFrame, ScalePolicy};
use crate::ids::PieceId;

#[derive(Debug, Clone, PartialEq)]
pub struct PieceSpec {
    pub piece_id: PieceId,
    pub initial: Point,
}

impl PieceSpec {
    pub fn new(piece_id: PieceId, initial: Point) -> Self {
        Self { piece_id, initial }
    }
}

/// Initial board state for one game. Every reset returns pieces here.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardLayout {
    pub slug: &'static str,
    pub frame: ReferenceFrame,
    pub scale_policy: ScalePolicy,
    pub grid: Option<GridBounds>,
    pub pieces: Vec<PieceSpec>,
}

impl BoardLayout {
    pub fn initial_position(&self, piece_id: &PieceId) -> Option<Point> {
        self.pieces
            .iter()
            .find(|spec| &spec.piece_id == piece_id)
            .map(|spec| spec.initial)
    }

    pub fn piece_ids(&self) -> impl Iterator<Item = &PieceId> {
        self.pieces.iter().map(|spec| &spec.piece_id)
    }

    pub fn contains(&self, piece_id: &PieceId) -> bool {
        self.initial_position(piece_id).is_some()
    }
}

pub const LAYOUT_CATALOG: &[&str] = &["amanogawa", "light-road", "uber-ninja"];

pub fn layout_by_slug(slug: &str) -> Option<BoardLayout> {
    match slug {
        "amanogawa" => Some(amanogawa()),
        "light-road" => Some(light_road()),
        "uber-ninja" => Some(uber_ninja()),
        _ => None,
    }
}

fn tile_grid(count: usize, origin: Point, step: Point) -> Vec<PieceSpec> {
    (0..count)
        .map(|i| {
            let col = (i % 4) as f32;
            let row = (i / 4) as f32;
            PieceSpec::new(
                PieceId::indexed("piece", i),
                Point::new(origin.x + col * step.x, origin.y + row * step.y),
            )
        })
        .collect()
}

pub fn amanogawa() -> BoardLayout {
    let frame = ReferenceFrame {
        width: 1000.0,
        height: 1200.0,
    };
    let mut pieces = tile_grid(25, Point::new(0.05, 0.4), Point::new(0.04, 0.04));
    pieces.push(PieceSpec::new(PieceId::named("player"), Point::new(0.5, 0.8)));
    BoardLayout {
        slug: "amanogawa",
        frame,
        scale_policy: ScalePolicy::FitNoUpscale,
        grid: GridBounds::centered(&frame, 500.0, 100.0).ok(),
        pieces,
    }
}

pub fn light_road() -> BoardLayout {
    let mut pieces = tile_grid(20, Point::new(0.15, 0.25), Point::new(0.08, 0.09));
    pieces.push(PieceSpec::new(PieceId::named("player"), Point::new(0.5, 0.85)));
    BoardLayout {
        slug: "light-road",
        frame: ReferenceFrame::default(),
        scale_policy: ScalePolicy::Fit,
        grid: None,
        pieces,
    }
}

/// Four fixed seats, `ninja-0` to `ninja-3`, not bound to roster entries.
pub fn uber_ninja() -> BoardLayout {
    let frame = ReferenceFrame::default();
    let pieces = (0..4)
        .map(|i| {
            let seat = FramePoint::new(150.0 + i as f32 * 120.0, 750.0);
            PieceSpec::new(PieceId::indexed("ninja", i), frame.normalize(seat))
        })
        .collect();
    BoardLayout {
        slug: "uber-ninja",
        frame,
        scale_policy: ScalePolicy::Fit,
        grid: None,
        pieces,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_slugs_resolve() {
        for slug in LAYOUT_CATALOG {
            let layout = layout_by_slug(slug).unwrap();
            assert_eq!(&layout.slug, slug);
        }
        assert!(layout_by_slug("lobby").is_none());
    }

    #[test]
    fn amanogawa_tiles_follow_four_column_grid() {
        let layout = amanogawa();
        assert_eq!(layout.pieces.len(), 26);
        let piece_5 = layout
            .initial_position(&PieceId::new("piece-5").unwrap())
            .unwrap();
        assert!(piece_5.approx_eq(Point::new(0.09, 0.44), 1e-6));
        let player = layout
            .initial_position(&PieceId::new("player").unwrap())
            .unwrap();
        assert_eq!(player, Point::new(0.5, 0.8));
        let grid = layout.grid.unwrap();
        assert_eq!((grid.left, grid.top, grid.cell_size), (250.0, 350.0, 100.0));
    }

    #[test]
    fn piece_ids_are_unique_per_layout() {
        for slug in LAYOUT_CATALOG {
            let layout = layout_by_slug(slug).unwrap();
            let mut ids: Vec<_> = layout.piece_ids().collect();
            let total = ids.len();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), total, "{slug}");
        }
    }

    #[test]
    fn uber_ninja_seats_are_normalized() {
        let layout = uber_ninja();
        let seat = layout.frame.to_frame(layout.pieces[2].initial);
        assert!((seat.x - 390.0).abs() < 1e-3);
        assert!((seat.y - 750.0).abs() < 1e-3);
    }
}
