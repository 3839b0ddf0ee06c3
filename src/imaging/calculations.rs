//! Pure calculation functions for pyramid sizing.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the TOAST depth needed to cover an image at full resolution.
///
/// Returns the smallest `depth` such that `tile_size * 2^depth >= longest_edge`,
/// which equals `ceil(log2(longest_edge / tile_size))` for images larger than a
/// tile. Images that fit in a single tile get depth 0.
///
/// Integer arithmetic keeps exact powers of two exact.
///
/// # Examples
/// ```
/// # use skytoast::imaging::toast_depth;
/// assert_eq!(toast_depth(256, 256), 0);
/// assert_eq!(toast_depth(257, 256), 1);
/// assert_eq!(toast_depth(1024, 256), 2);
/// assert_eq!(toast_depth(1_000_000, 256), 12);
/// ```
pub fn toast_depth(longest_edge: u32, tile_size: u32) -> u32 {
    let edge = u64::from(longest_edge);
    let mut covered = u64::from(tile_size.max(1));
    let mut depth = 0;
    while covered < edge {
        covered <<= 1;
        depth += 1;
    }
    depth
}

/// Number of tiles at a pyramid level: `4^level`.
pub fn tiles_at_level(level: u32) -> u64 {
    1u64 << (2 * level)
}

/// Number of tiles in a full pyramid of the given depth, root included.
pub fn total_tiles(depth: u32) -> u64 {
    (0..=depth).map(tiles_at_level).sum()
}
