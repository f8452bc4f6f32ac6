/// Dev-mode overlay
///
/// State behind the click-to-annotate overlay: which components are on the
/// page, which one is hovered or selected, where the feedback popover goes,
/// and the change request built from the selection.
///
/// - [`geometry`]: points, sizes, rects and the viewport
/// - [`placement`]: popover placement with flipping and clamping
/// - [`dom_path`]: CSS-like element paths
/// - [`registry`]: component registry, hover/selection, change drafts

pub mod dom_path;
pub mod geometry;
pub mod placement;
pub mod registry;
