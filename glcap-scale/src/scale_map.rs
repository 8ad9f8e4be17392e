//! Bilinear coefficient generation and the three pixel-processing kernels.
//!
//! Every kernel here is a direct port of the host pipeline's fixed-point
//! scaling core: a shrink search picks the largest integer source crop that
//! still samples in-bounds, then a per-destination-pixel table of four
//! source-byte offsets (`pos`) and four blend weights (`factor`) is built
//! once per format change and reused for every frame.

/// Finds the smallest non-negative integer shrink `r` such that
/// `d = (w - r) / sw` keeps every 2×2 sample footprint inside the source
/// image: `d*(sw-1)+1 <= w` and `d*(sh-1)+1 <= h`.
fn find_shrink(w: u32, h: u32, sw: u32, sh: u32) -> f64 {
    let mut r: u32 = 0;
    loop {
        let d = (w as f64 - r as f64) / sw as f64;
        if d * (sw as f64 - 1.0) + 1.0 <= w as f64 && d * (sh as f64 - 1.0) + 1.0 <= h as f64 {
            return d;
        }
        r += 1;
    }
}

/// Per-destination-pixel sample plan: four source byte offsets and the
/// blend weight for each, in top-left/top-right/bottom-left/bottom-right
/// order.
#[derive(Debug, Clone)]
pub struct ScaleMap {
    pub dst_w: u32,
    pub dst_h: u32,
    pos: Vec<[u32; 4]>,
    factor: Vec<[f32; 4]>,
}

impl ScaleMap {
    /// `src_row` is the source row stride in bytes (already accounting for
    /// any dword-alignment padding); `src_bpp` is 3 for BGR or 4 for BGRA.
    pub fn generate(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32, src_row: u32, src_bpp: u32) -> Self {
        debug_assert!(dst_w > 0 && dst_h > 0);
        let d = find_shrink(src_w, src_h, dst_w, dst_h);

        let mut pos = vec![[0u32; 4]; (dst_w * dst_h) as usize];
        let mut factor = vec![[0f32; 4]; (dst_w * dst_h) as usize];

        let mut ofy: f64 = 0.0;
        for y in 0..dst_h {
            let ofy_i = ofy as u32;
            let fy1 = (y as f64 * d - ofy_i as f64) as f32;
            let fy0 = 1.0 - fy1;

            let mut ofx: f64 = 0.0;
            for x in 0..dst_w {
                let ofx_i = ofx as u32;
                let fx1 = (x as f64 * d - ofx_i as f64) as f32;
                let fx0 = 1.0 - fx1;

                let idx = (x + y * dst_w) as usize;
                pos[idx] = [
                    ofx_i * src_bpp + ofy_i * src_row,
                    (ofx_i + 1) * src_bpp + ofy_i * src_row,
                    ofx_i * src_bpp + (ofy_i + 1) * src_row,
                    (ofx_i + 1) * src_bpp + (ofy_i + 1) * src_row,
                ];
                factor[idx] = [fx0 * fy0, fx1 * fy0, fx0 * fy1, fx1 * fy1];

                ofx += d;
            }
            ofy += d;
        }

        Self { dst_w, dst_h, pos, factor }
    }

    pub fn output_len(&self) -> usize {
        (self.dst_w * self.dst_h * 3) as usize
    }

    /// General bilinear 4-tap resample, always emitting BGR. The weighted
    /// sum is accumulated in `f32` and truncated through `u32` (never a
    /// signed intermediate) before narrowing to `u8`, matching the
    /// unsaturated truncating-assignment the fixed-point original used —
    /// the four weights always sum to 1 so no explicit clamp is needed.
    pub fn apply(&self, src: &[u8], dst: &mut [u8]) {
        debug_assert_eq!(dst.len(), self.output_len());
        for (i, (pos, factor)) in self.pos.iter().zip(self.factor.iter()).enumerate() {
            let tp = i * 3;
            for c in 0..3usize {
                let sum: f32 = pos
                    .iter()
                    .zip(factor.iter())
                    .map(|(&p, &f)| src[p as usize + c] as f32 * f)
                    .sum();
                dst[tp + c] = sum as u32 as u8;
            }
        }
    }
}

/// scale == 1.0, source BGRA: drop the alpha channel, copying BGR triples
/// row by row to strip any source row padding.
pub fn bgra_drop_alpha(src: &[u8], dst: &mut [u8], w: u32, h: u32, src_row: u32) {
    const SRC_BPP: usize = 4;
    let dst_row = w as usize * 3;
    for y in 0..h as usize {
        for x in 0..w as usize {
            let sp = x * SRC_BPP + y * src_row as usize;
            let tp = x * 3 + y * dst_row;
            dst[tp] = src[sp];
            dst[tp + 1] = src[sp + 1];
            dst[tp + 2] = src[sp + 2];
        }
    }
}

/// scale == 0.5: a 2×2 box filter, averaging four source pixels into one
/// destination pixel with a `>> 2` (divide-by-4) rather than a general
/// weighted blend.
pub fn box_filter_half(src: &[u8], dst: &mut [u8], dst_w: u32, dst_h: u32, src_row: u32, src_bpp: u32) {
    let src_row = src_row as usize;
    let src_bpp = src_bpp as usize;
    let dst_row = dst_w as usize * 3;

    let mut oy = 0usize;
    for y in 0..dst_h as usize {
        let mut ox = 0usize;
        for x in 0..dst_w as usize {
            let p0 = ox + oy * src_row;
            let p1 = ox + src_bpp + oy * src_row;
            let p2 = ox + (oy + 1) * src_row;
            let p3 = ox + src_bpp + (oy + 1) * src_row;
            let tp = x * 3 + y * dst_row;
            for c in 0..3 {
                let sum = src[p0 + c] as u32 + src[p1 + c] as u32 + src[p2 + c] as u32 + src[p3 + c] as u32;
                dst[tp + c] = (sum >> 2) as u8;
            }
            ox += 2 * src_bpp;
        }
        oy += 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_scale_map_samples_each_pixel_once() {
        // 2x2 -> 2x2: d must resolve to 1.0, and every destination pixel's
        // four taps collapse onto the same source offset.
        let map = ScaleMap::generate(2, 2, 2, 2, 2 * 3, 3);
        let src: Vec<u8> = vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120];
        let mut dst = vec![0u8; map.output_len()];
        map.apply(&src, &mut dst);
        assert_eq!(dst, src);
    }

    #[test]
    fn half_scale_downscale_averages_a_flat_block() {
        let w = 4u32;
        let h = 2u32;
        let row = (w * 3) as usize;
        let mut src = vec![0u8; row * h as usize];
        for px in src.chunks_mut(3) {
            px.copy_from_slice(&[40, 80, 120]);
        }
        let mut dst = vec![0u8; (w / 2 * h / 2 * 3) as usize];
        box_filter_half(&src, &mut dst, w / 2, h / 2, row as u32, 3);
        assert!(dst.iter().all(|&b| b == 40 || b == 80 || b == 120));
        assert_eq!(&dst[0..3], &[40, 80, 120]);
    }

    #[test]
    fn box_filter_averages_four_corners_of_a_2x2_block() {
        // pixels (0,0,0) (10,10,10) / (20,20,20) (30,30,30) -> (15,15,15)
        let src: Vec<u8> = vec![0, 0, 0, 10, 10, 10, 20, 20, 20, 30, 30, 30];
        let mut dst = vec![0u8; 3];
        box_filter_half(&src, &mut dst, 1, 1, 2 * 3, 3);
        assert_eq!(dst, vec![15, 15, 15]);
    }

    #[test]
    fn bgra_to_bgr_drops_alpha_on_a_two_pixel_row() {
        let src: Vec<u8> = vec![10, 20, 30, 255, 40, 50, 60, 128];
        let mut dst = vec![0u8; 6];
        bgra_drop_alpha(&src, &mut dst, 2, 1, 2 * 4);
        assert_eq!(dst, vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn bgra_drop_alpha_strips_the_fourth_channel_and_row_padding() {
        // 1x2 BGRA image with 4 bytes of row padding.
        let src: Vec<u8> = vec![
            1, 2, 3, 255, /* pad */ 0, 0, 0, 0,
            4, 5, 6, 255, /* pad */ 0, 0, 0, 0,
        ];
        let mut dst = vec![0u8; 1 * 2 * 3];
        bgra_drop_alpha(&src, &mut dst, 1, 2, 8);
        assert_eq!(dst, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn bilinear_weights_always_sum_to_one() {
        let map = ScaleMap::generate(5, 3, 4, 3, 5 * 3, 3);
        for factor in &map.factor {
            let sum: f32 = factor.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "weights {:?} summed to {sum}", factor);
        }
    }

    #[test]
    fn bilinear_downscale_stays_within_source_value_range() {
        let (sw, sh) = (4u32, 4u32);
        let row = (sw * 3) as usize;
        let src: Vec<u8> = (0..row * sh as usize).map(|i| (i % 256) as u8).collect();
        let map = ScaleMap::generate(sw, sh, 2, 2, row as u32, 3);
        let mut dst = vec![0u8; map.output_len()];
        map.apply(&src, &mut dst);
        assert!(dst.iter().all(|&b| (0..=255).contains(&b)));
    }
}
