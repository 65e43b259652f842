use crate::ocr::PixelRect;
use crate::region::Bounds;

pub(super) fn normalize_rect(rect: &PixelRect, width: u32, height: u32) -> Option<Bounds> {
    if width == 0 || height == 0 {
        return None;
    }
    let w = width as f32;
    let h = height as f32;
    Bounds::clamped(
        rect.left as f32 / w,
        rect.top as f32 / h,
        rect.right as f32 / w,
        rect.bottom as f32 / h,
    )
}

pub(super) fn union_rect(a: &PixelRect, b: &PixelRect) -> PixelRect {
    PixelRect {
        left: a.left.min(b.left),
        top: a.top.min(b.top),
        right: a.right.max(b.right),
        bottom: a.bottom.max(b.bottom),
    }
}

pub(super) fn rect_height(rect: &PixelRect) -> i32 {
    (rect.bottom - rect.top).max(0)
}
