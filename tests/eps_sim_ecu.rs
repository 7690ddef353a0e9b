mod common;

use common::{Bench, EpsState};
use eps_config::{
    eps::{EpsError, EpsIdentifier, ReadError, SetFeatureStage, WriteError},
    session::{SessionError, SessionState, SessionType},
};

#[test]
pub fn enable_assist_end_to_end() {
    let mut bench = Bench::new(EpsState::default());
    let change = bench.configurator().set_feature(true, true).unwrap();

    assert_eq!(change.previous.as_bytes(), &[0x08, 0x00, 0x0A]);
    assert_eq!(change.written.as_bytes(), &[0x18, 0x00, 0x0A]);
    assert!(change.verified);
    assert_eq!(bench.eps.state().coding, vec![0x18, 0x00, 0x0A]);

    let sent = bench.bus.sent_requests();
    assert_eq!(sent[0], vec![0x10, 0x03]);
    let reads: Vec<&[u8]> = sent[1..8].iter().map(|r| &r[..]).collect();
    assert_eq!(
        reads,
        vec![
            &[0x22, 0xF1, 0x91][..],
            &[0x22, 0xF1, 0x87],
            &[0x22, 0xF1, 0x89],
            &[0x22, 0xF1, 0x97],
            &[0x22, 0xF1, 0x9E],
            &[0x22, 0xF1, 0xA2],
            &[0x22, 0x06, 0x00],
        ]
    );
    assert_eq!(sent[8], vec![0x27, 0x03]);
    // 16 + 28183 = 28199 = 0x6E27
    assert_eq!(sent[9], vec![0x27, 0x04, 0x00, 0x00, 0x6E, 0x27]);
    assert_eq!(sent[10], vec![0x2E, 0x06, 0x00, 0x18, 0x00, 0x0A]);
    assert_eq!(sent[11], vec![0x22, 0x06, 0x00]);
    assert_eq!(sent.len(), 12);
}

#[test]
pub fn requests_use_target_addressing() {
    let mut bench = Bench::new(EpsState::default());
    let target = bench.target();
    assert_eq!(target.bus_index, 1);
    bench.configurator().show().unwrap();
    assert_eq!(bench.bus.ids(), (0x712, 0x77C));
    assert!(bench
        .bus
        .sent_requests_with_addr()
        .iter()
        .all(|(addr, _)| *addr == 0x712));
    // Nothing on the primary bus
    assert!(bench.device.bus(0).unwrap().sent_requests().is_empty());
}

#[test]
pub fn show_reads_identity_without_security() {
    let mut bench = Bench::new(EpsState::default());
    let identity = bench.configurator().show().unwrap();
    assert_eq!(bench.bus.sent_requests()[0], vec![0x10, 0x01]);
    assert_eq!(
        identity
            .record(EpsIdentifier::HardwarePartNumber)
            .value()
            .to_string(),
        "5Q0909144R"
    );
    assert_eq!(identity.coding().assist_enabled(), Some(false));
    assert!(!bench.bus.was_service_sent(0x27));
    assert!(!bench.bus.was_service_sent(0x2E));
    let printed = identity.to_string();
    assert!(printed.contains("EV_SteerAssisMQB version 001"));
    assert!(printed.contains("08000a"));
}

#[test]
pub fn toggle_round_trips_coding() {
    let original = vec![0b1110_1111, 0x5A, 0xA5, 0x01];
    let mut bench = Bench::new(EpsState {
        coding: original.clone(),
        ..Default::default()
    });
    let mut eps = bench.configurator();
    let on = eps.set_feature(true, true).unwrap();
    assert_eq!(on.written.as_bytes(), &[0xFF, 0x5A, 0xA5, 0x01]);
    let off = eps.set_feature(false, true).unwrap();
    assert_eq!(off.written.as_bytes(), &original[..]);
    drop(eps);
    assert_eq!(bench.eps.state().coding, original);
}

#[test]
pub fn rewriting_same_state_keeps_coding() {
    let mut bench = Bench::new(EpsState {
        coding: vec![0x10],
        ..Default::default()
    });
    let change = bench.configurator().set_feature(true, false).unwrap();
    assert!(change.unchanged());
    assert!(!change.verified);
    assert_eq!(bench.eps.state().coding, vec![0x10]);
}

#[test]
pub fn unsupported_variant_sends_no_security_or_write() {
    for dataset in [
        &b"EV_SteerAssisMQB"[..],
        &b"EV_SteerAssisMQB\0\0"[..],
        &b"EV_SteerAssisPQ35\0"[..],
    ] {
        let mut bench = Bench::new(EpsState {
            dataset: dataset.to_vec(),
            ..Default::default()
        });
        let err = bench.configurator().set_feature(true, true).unwrap_err();
        assert!(matches!(err, EpsError::UnsupportedVariant { .. }));
        assert!(!bench.bus.was_service_sent(0x27));
        assert!(!bench.bus.was_service_sent(0x2E));
        assert_eq!(bench.eps.state().coding, vec![0x08, 0x00, 0x0A]);
    }
}

#[test]
pub fn denied_key_sends_no_write() {
    let mut bench = Bench::new(EpsState {
        reject_key: true,
        ..Default::default()
    });
    let err = bench.configurator().set_feature(true, true).unwrap_err();
    assert!(matches!(
        err,
        EpsError::Write(WriteError::SecurityAccessDenied { code: 0x35, .. })
    ));
    assert!(!bench.bus.was_service_sent(0x2E));
    // One seed request and one key, no retry with a new seed
    assert_eq!(bench.sids().iter().filter(|s| **s == 0x27).count(), 2);
    assert_eq!(bench.eps.state().coding, vec![0x08, 0x00, 0x0A]);
}

#[test]
pub fn read_timeout_aborts_without_partial_result() {
    let mut state = EpsState::default();
    state.silent_dids.insert(0xF19E);
    let mut bench = Bench::new(state);
    let mut eps = bench.configurator();
    let err = eps.set_feature(true, true).unwrap_err();
    assert!(matches!(
        err,
        EpsError::Read(ReadError::Timeout {
            identifier: EpsIdentifier::DatasetFile
        })
    ));
    assert_eq!(eps.session().state(), SessionState::Closed);
    drop(eps);

    let sent = bench.bus.sent_requests();
    // Session control plus reads up to and including the dataset name
    assert_eq!(sent.len(), 6);
    assert_eq!(sent.last().unwrap(), &vec![0x22, 0xF1, 0x9E]);
    assert!(!bench.bus.was_service_sent(0x27));
    assert!(!bench.bus.was_service_sent(0x2E));
}

#[test]
pub fn set_feature_outside_extended_session_sends_nothing() {
    let mut bench = Bench::new(EpsState::default());
    let mut session = bench.session();
    session.open(SessionType::Default).unwrap();
    let identity = session.eps_read_identity().unwrap();
    let before = bench.bus.sent_requests().len();

    let err = session.eps_set_feature(true, &identity).unwrap_err();
    assert!(matches!(err, WriteError::SessionNotExtended(SessionState::Default)));
    assert_eq!(bench.bus.sent_requests().len(), before);
    assert!(!bench.bus.was_service_sent(0x27));
    assert!(!bench.bus.was_service_sent(0x2E));
}

#[test]
pub fn session_open_timeout_is_not_retried() {
    let mut bench = Bench::new(EpsState {
        silent_session: true,
        ..Default::default()
    });
    let mut eps = bench.configurator();
    let err = eps.set_feature(true, true).unwrap_err();
    assert!(matches!(
        err,
        EpsError::Session(SessionError::Timeout(SessionType::Extended))
    ));
    assert_eq!(eps.session().state(), SessionState::Closed);
    drop(eps);
    assert_eq!(bench.bus.sent_requests(), vec![vec![0x10, 0x03]]);
}

#[test]
pub fn rejected_write_leaves_coding() {
    let mut bench = Bench::new(EpsState {
        reject_write: true,
        ..Default::default()
    });
    let err = bench.configurator().set_feature(true, true).unwrap_err();
    assert!(matches!(
        err,
        EpsError::Write(WriteError::WriteRejected { code: 0x22, .. })
    ));
    assert_eq!(bench.eps.state().coding, vec![0x08, 0x00, 0x0A]);
    // No read back after a rejected write
    assert_eq!(bench.sids().last(), Some(&0x2E));
}

#[test]
pub fn write_after_response_pending() {
    let mut bench = Bench::new(EpsState {
        slow_write: true,
        ..Default::default()
    });
    let change = bench.configurator().set_feature(true, true).unwrap();
    assert!(change.verified);
    assert_eq!(bench.sids().iter().filter(|s| **s == 0x2E).count(), 1);
}

#[test]
pub fn verification_detects_ignored_write() {
    let mut bench = Bench::new(EpsState {
        drop_writes: true,
        ..Default::default()
    });
    let err = bench.configurator().set_feature(true, true).unwrap_err();
    match err {
        EpsError::Write(WriteError::VerificationMismatch { expected, actual }) => {
            assert_eq!(expected.as_bytes(), &[0x18, 0x00, 0x0A]);
            assert_eq!(actual.as_bytes(), &[0x08, 0x00, 0x0A]);
        }
        e => panic!("unexpected error {e:?}"),
    }
}

#[test]
pub fn write_without_verification_skips_read_back() {
    let mut bench = Bench::new(EpsState {
        drop_writes: true,
        ..Default::default()
    });
    let change = bench.configurator().set_feature(false, false).unwrap();
    assert!(!change.verified);
    assert_eq!(bench.sids().last(), Some(&0x2E));
}

#[test]
pub fn empty_coding_stops_before_security_access() {
    let mut bench = Bench::new(EpsState {
        coding: Vec::new(),
        ..Default::default()
    });
    let mut eps = bench.configurator();
    let err = eps.set_feature(true, true).unwrap_err();
    assert!(matches!(err, EpsError::Write(WriteError::EmptyCoding)));
    drop(eps);
    assert!(!bench.bus.was_service_sent(0x27));
}

#[test]
pub fn timeout_stage_is_reported() {
    let mut bench = Bench::new(EpsState::default());
    let mut session = bench.session();
    session.open(SessionType::Extended).unwrap();
    let identity = session.eps_read_identity().unwrap();
    // EPS goes quiet before security access
    bench.bus.clear_map();
    let err = session.eps_set_feature(true, &identity).unwrap_err();
    assert!(matches!(
        err,
        WriteError::Timeout {
            stage: SetFeatureStage::SeedRequested
        }
    ));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!bench.bus.was_service_sent(0x2E));
}

#[test]
pub fn key_timeout_stops_before_write() {
    let mut bench = Bench::new(EpsState {
        silent_key: true,
        ..Default::default()
    });
    let mut eps = bench.configurator();
    let err = eps.set_feature(true, true).unwrap_err();
    assert!(matches!(
        err,
        EpsError::Write(WriteError::Timeout {
            stage: SetFeatureStage::KeySent
        })
    ));
    assert_eq!(eps.session().state(), SessionState::Closed);
    drop(eps);
    assert_eq!(bench.sids().last(), Some(&0x27));
    assert!(!bench.bus.was_service_sent(0x2E));
    assert_eq!(bench.eps.state().coding, vec![0x08, 0x00, 0x0A]);
}

#[test]
pub fn write_timeout_reports_write_stage() {
    for state in [
        EpsState {
            silent_write: true,
            ..Default::default()
        },
        // Response pending, then the EPS never completes the write
        EpsState {
            stalled_write: true,
            ..Default::default()
        },
    ] {
        let mut bench = Bench::new(state);
        let mut eps = bench.configurator();
        let err = eps.set_feature(true, true).unwrap_err();
        assert!(matches!(
            err,
            EpsError::Write(WriteError::Timeout {
                stage: SetFeatureStage::WritePending
            })
        ));
        assert_eq!(eps.session().state(), SessionState::Closed);
        drop(eps);
        // One write, no retry and no read back
        assert_eq!(bench.sids().iter().filter(|s| **s == 0x2E).count(), 1);
        assert_eq!(bench.sids().last(), Some(&0x2E));
    }
}
