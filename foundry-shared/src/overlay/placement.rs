/// Popover placement
///
/// Positions the feedback popover next to the selected component so it stays
/// inside the viewport (minus `padding`).
///
/// The preferred side is kept if the popover fits there. Otherwise the
/// opposite side is tried, then the two perpendicular sides (right before
/// left, bottom before top). If nothing fits, the side with the most room
/// wins and the popover is clamped into the viewport, possibly covering the
/// anchor.
///
/// ```
/// use foundry_shared::overlay::geometry::{Rect, Size, Viewport};
/// use foundry_shared::overlay::placement::{compute_placement, PlacementOptions, Side};
///
/// let anchor = Rect::new(100.0, 560.0, 80.0, 30.0);
/// let placement = compute_placement(
///     anchor,
///     Size::new(200.0, 120.0),
///     Viewport::new(1024.0, 600.0),
///     &PlacementOptions::default(),
/// );
///
/// // No room below the anchor, so the popover flips above it
/// assert_eq!(placement.side, Side::Top);
/// assert!(placement.flipped);
/// assert_eq!(placement.y, 560.0 - 8.0 - 120.0);
/// ```

use serde::{Deserialize, Serialize};

use super::geometry::{Rect, Size, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    Bottom,
    Left,
    Right,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Top => Side::Bottom,
            Side::Bottom => Side::Top,
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    fn perpendicular(&self) -> [Side; 2] {
        match self {
            Side::Top | Side::Bottom => [Side::Right, Side::Left],
            Side::Left | Side::Right => [Side::Bottom, Side::Top],
        }
    }

    pub fn is_vertical(&self) -> bool {
        matches!(self, Side::Top | Side::Bottom)
    }
}

/// Cross-axis alignment relative to the anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Start,
    Center,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementOptions {
    pub side: Side,
    pub align: Align,

    /// Gap between anchor and popover
    pub offset: f64,

    /// Minimum distance from the viewport edges
    pub padding: f64,
}

impl Default for PlacementOptions {
    fn default() -> Self {
        Self {
            side: Side::Bottom,
            align: Align::Start,
            offset: 8.0,
            padding: 8.0,
        }
    }
}

/// Computed popover position (top-left corner)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub side: Side,
    pub x: f64,
    pub y: f64,

    /// The preferred side was abandoned
    pub flipped: bool,
}

impl Placement {
    pub fn rect(&self, popover: Size) -> Rect {
        Rect::new(self.x, self.y, popover.width, popover.height)
    }
}

/// Room between the anchor (plus offset) and the padded viewport edge
fn available_space(side: Side, anchor: &Rect, bounds: &Rect, offset: f64) -> f64 {
    match side {
        Side::Top => anchor.top() - offset - bounds.top(),
        Side::Bottom => bounds.bottom() - anchor.bottom() - offset,
        Side::Left => anchor.left() - offset - bounds.left(),
        Side::Right => bounds.right() - anchor.right() - offset,
    }
}

fn main_extent(side: Side, popover: Size) -> f64 {
    if side.is_vertical() {
        popover.height
    } else {
        popover.width
    }
}

/// Keeps `[position, position + size]` inside `[min, max]`; oversize items pin to `min`
fn clamp_axis(position: f64, size: f64, min: f64, max: f64) -> f64 {
    if size >= max - min {
        min
    } else {
        position.clamp(min, max - size)
    }
}

fn align_position(align: Align, start: f64, anchor_extent: f64, size: f64) -> f64 {
    match align {
        Align::Start => start,
        Align::Center => start + (anchor_extent - size) / 2.0,
        Align::End => start + anchor_extent - size,
    }
}

/// Places a `popover` next to `anchor` inside `viewport`
pub fn compute_placement(
    anchor: Rect,
    popover: Size,
    viewport: Viewport,
    options: &PlacementOptions,
) -> Placement {
    let bounds = viewport.rect().inset(options.padding);
    let preferred = options.side;
    let [first_perpendicular, second_perpendicular] = preferred.perpendicular();
    let candidates = [
        preferred,
        preferred.opposite(),
        first_perpendicular,
        second_perpendicular,
    ];

    let fitting = candidates.iter().copied().find(|side| {
        main_extent(*side, popover) <= available_space(*side, &anchor, &bounds, options.offset)
    });

    let (side, fits) = match fitting {
        Some(side) => (side, true),
        None => {
            // Strictly greater keeps the earlier candidate on ties
            let roomiest = candidates.iter().copied().fold(preferred, |best, side| {
                let room = available_space(side, &anchor, &bounds, options.offset);
                let best_room = available_space(best, &anchor, &bounds, options.offset);
                if room > best_room {
                    side
                } else {
                    best
                }
            });
            (roomiest, false)
        }
    };

    let (mut x, mut y) = match side {
        Side::Top => (
            align_position(options.align, anchor.left(), anchor.width, popover.width),
            anchor.top() - options.offset - popover.height,
        ),
        Side::Bottom => (
            align_position(options.align, anchor.left(), anchor.width, popover.width),
            anchor.bottom() + options.offset,
        ),
        Side::Left => (
            anchor.left() - options.offset - popover.width,
            align_position(options.align, anchor.top(), anchor.height, popover.height),
        ),
        Side::Right => (
            anchor.right() + options.offset,
            align_position(options.align, anchor.top(), anchor.height, popover.height),
        ),
    };

    if side.is_vertical() {
        x = clamp_axis(x, popover.width, bounds.left(), bounds.right());
        if !fits {
            y = clamp_axis(y, popover.height, bounds.top(), bounds.bottom());
        }
    } else {
        y = clamp_axis(y, popover.height, bounds.top(), bounds.bottom());
        if !fits {
            x = clamp_axis(x, popover.width, bounds.left(), bounds.right());
        }
    }

    Placement {
        side,
        x,
        y,
        flipped: side != preferred,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: Viewport = Viewport {
        width: 1000.0,
        height: 800.0,
    };

    fn options(side: Side, align: Align) -> PlacementOptions {
        PlacementOptions {
            side,
            align,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_options() {
        let defaults = PlacementOptions::default();
        assert_eq!(defaults.side, Side::Bottom);
        assert_eq!(defaults.align, Align::Start);
        assert_eq!(defaults.offset, 8.0);
        assert_eq!(defaults.padding, 8.0);
    }

    #[test]
    fn test_preferred_side_kept_when_it_fits() {
        let anchor = Rect::new(100.0, 100.0, 50.0, 20.0);
        let placement = compute_placement(
            anchor,
            Size::new(200.0, 100.0),
            VIEWPORT,
            &PlacementOptions::default(),
        );

        assert_eq!(
            placement,
            Placement {
                side: Side::Bottom,
                x: 100.0,
                y: 128.0,
                flipped: false
            }
        );
    }

    #[test]
    fn test_flips_to_opposite_side() {
        let anchor = Rect::new(100.0, 40.0, 50.0, 20.0);
        let placement = compute_placement(
            anchor,
            Size::new(200.0, 100.0),
            VIEWPORT,
            &options(Side::Top, Align::Start),
        );

        assert_eq!(placement.side, Side::Bottom);
        assert!(placement.flipped);
        assert_eq!(placement.y, 68.0);
    }

    #[test]
    fn test_falls_back_to_perpendicular_side() {
        // Full-height anchor on the left: nothing above or below
        let anchor = Rect::new(0.0, 0.0, 200.0, 800.0);
        let placement = compute_placement(
            anchor,
            Size::new(300.0, 100.0),
            VIEWPORT,
            &PlacementOptions::default(),
        );

        assert_eq!(placement.side, Side::Right);
        assert!(placement.flipped);
        assert_eq!(placement.x, 208.0);
        // Start-aligned to the anchor top, clamped into the padding
        assert_eq!(placement.y, 8.0);
    }

    #[test]
    fn test_perpendicular_order_prefers_right() {
        // Room on both sides: right wins
        let anchor = Rect::new(400.0, 0.0, 100.0, 800.0);
        let placement = compute_placement(
            anchor,
            Size::new(300.0, 100.0),
            VIEWPORT,
            &PlacementOptions::default(),
        );
        assert_eq!(placement.side, Side::Right);

        // Room only on the left
        let wide = Rect::new(500.0, 0.0, 300.0, 800.0);
        let placement = compute_placement(
            wide,
            Size::new(300.0, 100.0),
            VIEWPORT,
            &PlacementOptions::default(),
        );
        assert_eq!(placement.side, Side::Left);
        assert_eq!(placement.x, 500.0 - 8.0 - 300.0);
    }

    #[test]
    fn test_nothing_fits_uses_roomiest_side() {
        let anchor = Rect::new(100.0, 300.0, 800.0, 100.0);
        let popover = Size::new(900.0, 500.0);
        let placement = compute_placement(anchor, popover, VIEWPORT, &PlacementOptions::default());

        // 384px below vs 284px above, neither fits 500px
        assert_eq!(placement.side, Side::Bottom);
        assert!(!placement.flipped);
        let rect = placement.rect(popover);
        assert!(rect.bottom() <= 792.0);
        assert!(rect.right() <= 992.0);
    }

    #[test]
    fn test_center_and_end_alignment() {
        let anchor = Rect::new(400.0, 100.0, 100.0, 20.0);
        let popover = Size::new(200.0, 50.0);

        let centered = compute_placement(anchor, popover, VIEWPORT, &options(Side::Bottom, Align::Center));
        assert_eq!(centered.x, 350.0);

        let end = compute_placement(anchor, popover, VIEWPORT, &options(Side::Bottom, Align::End));
        assert_eq!(end.x, 300.0);

        let right = compute_placement(anchor, popover, VIEWPORT, &options(Side::Right, Align::Center));
        assert_eq!(right.x, 508.0);
        assert_eq!(right.y, 85.0);
    }

    #[test]
    fn test_cross_axis_clamped_into_viewport() {
        let anchor = Rect::new(950.0, 100.0, 40.0, 20.0);
        let placement = compute_placement(
            anchor,
            Size::new(200.0, 50.0),
            VIEWPORT,
            &PlacementOptions::default(),
        );

        assert_eq!(placement.side, Side::Bottom);
        assert_eq!(placement.x, 1000.0 - 8.0 - 200.0);
    }

    #[test]
    fn test_oversized_popover_pins_to_padding() {
        let anchor = Rect::new(10.0, 10.0, 10.0, 10.0);
        let placement = compute_placement(
            anchor,
            Size::new(2000.0, 50.0),
            VIEWPORT,
            &PlacementOptions::default(),
        );
        assert_eq!(placement.x, 8.0);
    }

    #[test]
    fn test_side_helpers() {
        assert_eq!(Side::Left.opposite(), Side::Right);
        assert_eq!(Side::Top.perpendicular(), [Side::Right, Side::Left]);
        assert!(Side::Bottom.is_vertical());
        assert_eq!(serde_json::to_string(&Side::Top).unwrap(), "\"top\"");
    }
}
