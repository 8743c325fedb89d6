//! Precomputed velocity-to-amplitude mapping curves.
//!
//! The device exposes twelve fixed velocity curves selectable by SysEx or by
//! the synth facade; `StartPlayingVoice` uses the currently selected curve to
//! turn a MIDI note-on velocity (0..127) into an amplitude target. The curve
//! data below reproduces the device's tables verbatim: they are empirically
//! tuned perceptual-loudness curves, not something to re-derive analytically.

/// Number of selectable velocity curves.
pub const NUM_VELOCITY_CURVES: usize = 12;

/// Twelve 128-entry velocity curves, indexed `[curve][velocity]`.
pub const VELOCITY_CURVES: [[i32; 128]; NUM_VELOCITY_CURVES] = [
    [
        0, 1, 1, 1, 2, 2, 2, 2, 3, 3, 4, 5, 6, 7, 8, 9, 11, 13, 14, 16, 18, 20, 22, 24, 26, 28, 30,
        32, 34, 36, 39, 41, 43, 45, 47, 49, 51, 52, 54, 55, 57, 59, 60, 61, 63, 64, 66, 67, 68, 69,
        70, 72, 73, 74, 76, 77, 78, 79, 81, 82, 83, 84, 85, 86, 87, 87, 88, 89, 90, 91, 91, 92, 93,
        93, 94, 95, 95, 96, 97, 97, 98, 99, 100, 100, 101, 102, 102, 103, 104, 104, 105, 106, 106,
        107, 108, 108, 109, 110, 111, 111, 112, 113, 113, 114, 115, 115, 116, 117, 117, 118, 119,
        119, 120, 121, 122, 122, 123, 123, 124, 124, 124, 125, 125, 125, 126, 126, 126, 127,
    ],
    [
        0, 1, 1, 1, 2, 2, 2, 2, 3, 3, 4, 5, 6, 7, 8, 9, 11, 13, 14, 16, 18, 20, 22, 24, 26, 28, 30,
        32, 34, 36, 39, 41, 43, 45, 47, 49, 51, 52, 54, 55, 57, 59, 60, 61, 63, 64, 66, 67, 68, 69,
        70, 72, 73, 74, 76, 77, 78, 79, 81, 82, 83, 84, 85, 86, 87, 87, 88, 89, 90, 91, 91, 92, 93,
        93, 94, 95, 95, 96, 97, 97, 98, 99, 100, 100, 101, 102, 102, 103, 104, 104, 105, 106, 106,
        107, 108, 108, 109, 110, 111, 111, 112, 113, 113, 114, 115, 115, 116, 117, 117, 118, 119,
        119, 120, 121, 122, 122, 123, 123, 124, 124, 124, 125, 125, 125, 126, 126, 126, 127,
    ],
    [
        0, 1, 1, 1, 2, 2, 2, 2, 3, 3, 4, 5, 6, 7, 8, 9, 11, 12, 13, 15, 17, 19, 21, 23, 25, 27, 29,
        31, 33, 35, 37, 39, 41, 43, 45, 47, 49, 50, 52, 53, 55, 57, 58, 59, 60, 61, 63, 64, 65, 66,
        67, 69, 70, 71, 73, 74, 75, 76, 78, 79, 80, 81, 82, 83, 83, 84, 85, 86, 87, 88, 88, 89, 90,
        90, 91, 92, 92, 93, 94, 94, 95, 96, 97, 97, 98, 99, 99, 101, 102, 102, 103, 104, 104, 105,
        106, 106, 107, 108, 109, 110, 111, 112, 112, 113, 114, 114, 115, 116, 117, 118, 119, 119,
        120, 121, 122, 122, 123, 123, 124, 124, 124, 125, 125, 125, 126, 126, 126, 127,
    ],
    [
        0, 1, 1, 1, 2, 2, 2, 2, 3, 3, 4, 5, 6, 7, 7, 8, 10, 12, 13, 15, 17, 18, 20, 22, 24, 26, 28,
        29, 31, 33, 36, 38, 40, 41, 43, 45, 47, 48, 50, 51, 52, 54, 55, 56, 58, 59, 61, 62, 62, 63,
        64, 66, 67, 68, 70, 71, 72, 73, 74, 75, 76, 77, 78, 79, 80, 80, 81, 82, 83, 84, 84, 85, 86,
        87, 88, 89, 89, 90, 91, 91, 92, 93, 94, 95, 96, 97, 97, 98, 99, 99, 101, 102, 102, 103, 104,
        104, 106, 107, 108, 108, 109, 110, 111, 112, 113, 113, 115, 116, 116, 117, 118, 119, 120,
        121, 122, 122, 123, 123, 124, 124, 124, 125, 125, 125, 126, 126, 126, 127,
    ],
    [
        0, 1, 1, 1, 2, 2, 2, 2, 3, 3, 4, 5, 5, 6, 7, 8, 10, 11, 12, 14, 16, 18, 19, 21, 23, 25, 26,
        28, 30, 32, 34, 36, 38, 40, 41, 43, 45, 46, 47, 48, 50, 52, 53, 54, 55, 56, 58, 59, 60, 61,
        61, 63, 64, 65, 67, 68, 69, 69, 71, 72, 73, 74, 75, 76, 76, 77, 78, 79, 80, 81, 81, 82, 83,
        83, 84, 86, 86, 87, 88, 88, 89, 91, 92, 92, 93, 94, 94, 96, 97, 97, 98, 100, 100, 101, 102,
        103, 104, 105, 106, 107, 108, 109, 110, 111, 112, 112, 114, 115, 116, 117, 118, 119, 120,
        121, 122, 122, 123, 123, 124, 124, 124, 125, 125, 125, 126, 126, 126, 127,
    ],
    [
        0, 1, 1, 1, 2, 2, 2, 2, 3, 3, 4, 4, 5, 6, 7, 8, 9, 11, 12, 13, 15, 17, 18, 20, 22, 23, 25,
        27, 28, 30, 33, 34, 36, 38, 39, 41, 43, 44, 45, 46, 48, 49, 50, 51, 53, 54, 55, 56, 57, 58,
        59, 60, 61, 62, 64, 65, 65, 66, 68, 69, 70, 70, 71, 72, 73, 73, 74, 75, 76, 77, 78, 79, 80,
        80, 81, 82, 83, 84, 85, 85, 87, 88, 89, 89, 90, 92, 92, 93, 94, 95, 96, 97, 98, 99, 100,
        101, 102, 103, 105, 105, 107, 108, 108, 110, 111, 112, 113, 115, 115, 116, 118, 118, 120,
        121, 122, 122, 123, 123, 124, 124, 124, 125, 125, 125, 126, 126, 126, 127,
    ],
    [
        0, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 4, 5, 6, 7, 7, 9, 10, 11, 13, 14, 16, 18, 19, 21, 22, 24,
        26, 27, 29, 31, 33, 34, 36, 37, 39, 41, 41, 43, 44, 45, 47, 48, 49, 50, 51, 53, 53, 54, 55,
        56, 57, 58, 59, 61, 61, 62, 63, 65, 65, 66, 67, 68, 69, 69, 70, 71, 72, 73, 74, 74, 76, 77,
        77, 78, 79, 80, 81, 82, 82, 84, 85, 86, 87, 88, 89, 89, 91, 92, 93, 94, 95, 96, 97, 98, 99,
        100, 102, 103, 104, 105, 107, 107, 109, 110, 111, 112, 114, 115, 116, 118, 118, 120, 121,
        122, 122, 123, 123, 124, 124, 124, 125, 125, 125, 126, 126, 126, 127,
    ],
    [
        0, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 4, 5, 6, 6, 7, 8, 10, 11, 12, 14, 15, 17, 18, 20, 21, 23,
        24, 26, 27, 30, 31, 33, 34, 36, 37, 39, 39, 41, 42, 43, 45, 45, 46, 48, 48, 50, 51, 51, 52,
        53, 54, 55, 56, 58, 58, 59, 60, 61, 62, 63, 64, 64, 65, 66, 66, 67, 68, 70, 71, 71, 72, 73,
        74, 75, 76, 77, 78, 79, 80, 81, 82, 83, 84, 85, 86, 87, 88, 90, 90, 92, 93, 94, 95, 97, 97,
        99, 100, 102, 102, 104, 105, 106, 108, 109, 110, 112, 113, 114, 116, 117, 118, 120, 121,
        122, 122, 123, 123, 124, 124, 124, 125, 125, 125, 126, 126, 126, 127,
    ],
    [
        0, 1, 1, 1, 2, 2, 2, 2, 3, 2, 3, 4, 5, 5, 6, 7, 8, 9, 10, 11, 13, 14, 16, 17, 19, 20, 21,
        23, 24, 26, 28, 29, 31, 32, 34, 35, 37, 37, 39, 39, 41, 42, 43, 44, 45, 46, 47, 48, 49, 49,
        50, 52, 52, 53, 54, 55, 56, 57, 58, 59, 59, 60, 61, 62, 62, 63, 64, 65, 66, 67, 68, 69, 70,
        71, 72, 73, 74, 75, 76, 77, 78, 79, 81, 81, 83, 84, 84, 86, 87, 88, 89, 91, 92, 93, 95, 95,
        97, 98, 100, 101, 102, 104, 105, 107, 108, 109, 111, 113, 114, 115, 117, 118, 120, 121,
        122, 122, 123, 123, 124, 124, 124, 125, 125, 125, 126, 126, 126, 127,
    ],
    [
        0, 1, 1, 1, 2, 2, 2, 2, 2, 2, 3, 4, 4, 5, 6, 6, 7, 9, 9, 11, 12, 14, 15, 16, 18, 19, 20, 22,
        23, 24, 26, 28, 29, 30, 32, 33, 34, 35, 36, 37, 39, 40, 41, 41, 43, 43, 45, 45, 46, 47, 47,
        49, 49, 50, 51, 52, 53, 53, 55, 55, 56, 57, 57, 58, 59, 59, 60, 62, 63, 64, 64, 66, 67, 67,
        69, 70, 70, 72, 73, 74, 75, 76, 78, 78, 80, 81, 82, 83, 85, 86, 87, 89, 89, 91, 93, 93, 95,
        97, 99, 99, 101, 103, 104, 106, 107, 108, 110, 112, 113, 115, 117, 118, 120, 121, 122, 122,
        123, 123, 124, 124, 124, 125, 125, 125, 126, 126, 126, 127,
    ],
    [
        0, 1, 1, 1, 2, 2, 2, 2, 2, 2, 3, 4, 4, 5, 5, 6, 7, 8, 9, 10, 11, 13, 14, 15, 17, 18, 19, 20,
        22, 23, 25, 26, 27, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 43, 44, 44,
        46, 46, 47, 48, 49, 50, 50, 51, 52, 53, 53, 54, 55, 55, 56, 57, 58, 59, 61, 61, 62, 64, 64,
        65, 67, 67, 69, 70, 71, 72, 74, 75, 76, 77, 79, 79, 81, 83, 83, 85, 87, 87, 89, 91, 92, 93,
        95, 97, 98, 100, 102, 103, 104, 106, 107, 109, 111, 113, 115, 117, 118, 120, 121, 122, 122,
        123, 123, 124, 124, 124, 125, 125, 125, 126, 126, 126, 127,
    ],
    [
        0, 1, 1, 1, 2, 2, 2, 2, 2, 2, 3, 3, 4, 5, 5, 6, 7, 8, 8, 10, 11, 12, 13, 14, 15, 17, 18, 19,
        20, 21, 23, 24, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 36, 37, 38, 39, 40, 40, 41, 42,
        43, 43, 44, 45, 46, 46, 47, 48, 49, 49, 50, 51, 51, 52, 52, 53, 55, 56, 57, 58, 59, 60, 61,
        62, 64, 64, 66, 67, 68, 69, 71, 72, 73, 75, 76, 77, 79, 80, 81, 83, 84, 85, 87, 89, 90, 92,
        94, 95, 96, 98, 100, 101, 103, 105, 107, 109, 111, 112, 114, 116, 118, 120, 121, 122, 122,
        123, 123, 124, 124, 124, 125, 125, 125, 126, 126, 126, 127,
    ],
];

/// Look up the amplitude mapping for `velocity` (0..127) under `curve` (0..11).
///
/// The original firmware indexed `velocity_curves[velocity_func + 1]`, which
/// reaches one row past the end of its 12-row table whenever the full SysEx
/// range (0..=11) was selected — a latent out-of-bounds read in the source
/// that the public setter masked by clamping to 0..10. This crate selects
/// `curve` directly against all twelve rows instead, so every SysEx-reachable
/// curve index is both valid and in range.
pub fn lookup(curve: u32, velocity: u8) -> i32 {
    let curve = (curve as usize).min(NUM_VELOCITY_CURVES - 1);
    let velocity = (velocity as usize).min(127);
    VELOCITY_CURVES[curve][velocity]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_zero_velocity_zero_is_zero() {
        assert_eq!(lookup(0, 0), 0);
    }

    #[test]
    fn curve_is_monotonic_non_decreasing() {
        for curve in &VELOCITY_CURVES {
            for pair in curve.windows(2) {
                assert!(pair[0] <= pair[1]);
            }
        }
    }

    #[test]
    fn out_of_range_curve_clamps_instead_of_panicking() {
        assert_eq!(lookup(99, 127), lookup(11, 127));
    }
}
