//! Gesture label table, one entry per model output class

/// Gesture names in model output order
pub const GESTURES: [&str; 14] = [
    "fist",
    "1 finger",
    "2 fingers",
    "3 fingers",
    "4 fingers",
    "palm",
    "phone",
    "mouth",
    "open mouth",
    "ok",
    "pinky",
    "rock1",
    "rock2",
    "stop",
];

/// Number of classes the model must output
pub const GESTURE_COUNT: usize = GESTURES.len();

/// Text reported before any successful detection
pub const NO_GESTURE: &str = "none";

/// Label for a class index, if in range
pub fn label(index: usize) -> Option<&'static str> {
    GESTURES.get(index).copied()
}
