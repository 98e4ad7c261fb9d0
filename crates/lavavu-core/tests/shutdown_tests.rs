//! Process exit shutdown
//!
//! Kept in its own binary: `shutdown_all` closes every session in the
//! process, including those of tests running alongside.

mod common;

use lavavu_core::shutdown_all;

#[test]
fn test_shutdown_all_closes_live_sessions() {
    let direct = common::direct();
    let threaded = common::threaded();
    let weak = threaded.downgrade();

    shutdown_all();
    assert!(direct.is_closed());
    assert!(threaded.is_closed());
    assert!(weak.upgrade().is_none());
    assert!(direct.commands("zoom 2").is_err());

    // Nothing registered any more
    shutdown_all();
    assert!(direct.is_closed());

    // Dropping a closed session does not close it again
    drop(direct);
    drop(threaded);

    let later = common::direct();
    assert!(!later.is_closed());
    later.commands("zoom 2").unwrap();
    shutdown_all();
    assert!(later.is_closed());
}
