// src/region/decoration.rs

use crate::region::{Region, RegionId};

/// Rendering hooks for region affordances, independent of how regions are
/// drawn. The controller calls these; it never queries the view.
pub trait RegionDecoration {
    /// Pointer entered the region: show its Loop / Delete controls.
    fn on_hover_enter(&mut self, region: &Region, looping: bool);

    fn on_hover_leave(&mut self, region: RegionId);

    /// Selected or looping regions are drawn active.
    fn on_highlight(&mut self, region: RegionId, active: bool);

    fn on_removed(&mut self, _region: RegionId) {}
}

pub struct NoDecoration;

impl RegionDecoration for NoDecoration {
    fn on_hover_enter(&mut self, _region: &Region, _looping: bool) {}

    fn on_hover_leave(&mut self, _region: RegionId) {}

    fn on_highlight(&mut self, _region: RegionId, _active: bool) {}
}
