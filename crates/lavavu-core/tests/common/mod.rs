//! Shared session builders for integration tests

use lavavu_core::{Session, SessionConfig, SessionMode};

/// A session whose backend calls run on the test thread
pub fn direct() -> Session {
    Session::new(SessionConfig::default().with_mode(SessionMode::Direct)).expect("direct session")
}

/// A session with its own render thread
#[allow(dead_code)]
pub fn threaded() -> Session {
    Session::new(SessionConfig::default().with_mode(SessionMode::Thread)).expect("threaded session")
}

/// The 2x2 corner vertices of a unit square in the z=0 plane
#[allow(dead_code)]
pub fn unit_square() -> Vec<[f32; 3]> {
    vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]]
}
