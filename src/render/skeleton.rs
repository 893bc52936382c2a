//! COCO-17 body topology.

pub const KEYPOINT_COUNT: usize = 17;

/// Joint pairs joined by a bone.
pub const EDGES: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 7),
    (7, 9),
    (6, 8),
    (8, 10),
    (5, 11),
    (6, 12),
    (11, 12),
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
];

/// Joints that get a text tag.
pub const NAMED_JOINTS: [(usize, &str); 5] = [
    (0, "HEAD"),
    (9, "L HAND"),
    (10, "R HAND"),
    (15, "L FOOT"),
    (16, "R FOOT"),
];
