/// Placement of a scaled image inside the output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitGeometry {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

/// Scale `src` so it fills the surface along its relatively larger dimension
/// while keeping its aspect ratio, and center it.
///
/// Sizes are truncated, offsets are floored. Integer arithmetic keeps exact
/// ratios such as 4:3 on 1080 lines from losing a pixel to rounding.
pub fn fit_within(src_w: u32, src_h: u32, surface_w: u32, surface_h: u32) -> FitGeometry {
    let iw = u64::from(src_w.max(1));
    let ih = u64::from(src_h.max(1));
    let sw = u64::from(surface_w.max(1));
    let sh = u64::from(surface_h.max(1));

    // iw / ih > sw / sh, cross-multiplied
    let (width, height) = if iw * sh > sw * ih {
        (sw, sw * ih / iw)
    } else {
        (sh * iw / ih, sh)
    };
    let width = width.max(1) as u32;
    let height = height.max(1) as u32;
    let (x, y) = center_offset(width, height, surface_w, surface_h);
    FitGeometry {
        width,
        height,
        x,
        y,
    }
}

pub fn center_offset(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> (u32, u32) {
    let ox = outer_w.saturating_sub(inner_w) / 2;
    let oy = outer_h.saturating_sub(inner_h) / 2;
    (ox, oy)
}
