//! Interface-mode state machine properties.

use enrollment_station::domain::InterfaceMode;
use enrollment_station::EnrollmentError;

#[test]
fn every_legal_mode_encodes_and_decodes() {
    for mode in InterfaceMode::ALL {
        let byte = mode.mode_byte().expect("legal mode must encode");
        assert_eq!(InterfaceMode::from_mode_byte(byte).unwrap(), mode);
    }
}

#[test]
fn toggle_flips_only_ccid_when_another_interface_remains() {
    for mode in InterfaceMode::ALL {
        if mode.ccid && !mode.otp && !mode.u2f {
            continue; // CCID-only fallback, covered separately
        }
        let next = mode.toggled_ccid().expect("toggle of legal mode");
        assert_eq!(next.ccid, !mode.ccid, "CCID bit must flip for {mode}");
        assert_eq!(next.otp, mode.otp, "OTP bit must hold for {mode}");
        assert_eq!(next.u2f, mode.u2f, "U2F bit must hold for {mode}");
        assert_eq!(next.eject, mode.eject, "eject flag must hold for {mode}");
        // The result is itself legal.
        next.mode_byte().expect("toggled mode must be legal");
    }
}

#[test]
fn toggle_is_an_involution_outside_the_fallback() {
    for mode in InterfaceMode::ALL {
        if mode.ccid && !mode.otp && !mode.u2f {
            continue;
        }
        let round_trip = mode.toggled_ccid().unwrap().toggled_ccid().unwrap();
        assert_eq!(round_trip, mode, "double toggle must restore {mode}");
    }
}

#[test]
fn ccid_only_falls_back_to_otp_only() {
    let ccid_only = InterfaceMode::from_mode_byte(0x01).unwrap();
    let next = ccid_only.toggled_ccid().unwrap();
    assert!(next.otp && !next.u2f && !next.ccid && !next.eject);

    let ccid_only_eject = InterfaceMode::from_mode_byte(0x81).unwrap();
    let next = ccid_only_eject.toggled_ccid().unwrap();
    assert!(next.otp && !next.u2f && !next.ccid && next.eject);
}

#[test]
fn ccid_partition_is_exact() {
    let active: Vec<_> = InterfaceMode::ALL
        .iter()
        .filter(|m| m.is_ccid_active())
        .collect();
    let inactive: Vec<_> = InterfaceMode::ALL
        .iter()
        .filter(|m| !m.is_ccid_active())
        .collect();

    // 4 CCID-bearing combinations x eject vs 3 without x eject.
    assert_eq!(active.len(), 8);
    assert_eq!(inactive.len(), 6);
    assert_eq!(active.len() + inactive.len(), InterfaceMode::ALL.len());
}

#[test]
fn otp_only_toggles_to_otp_ccid_and_back() {
    let otp_only = InterfaceMode::from_mode_byte(0x00).unwrap();

    let otp_ccid = otp_only.toggled_ccid().unwrap();
    assert_eq!(otp_ccid.mode_byte().unwrap(), 0x02);

    let back = otp_ccid.toggled_ccid().unwrap();
    assert_eq!(back, otp_only);
}

#[test]
fn unknown_mode_bytes_never_succeed() {
    let mut legal = 0;
    for byte in 0x00..=0xff_u16 {
        match InterfaceMode::from_mode_byte(byte as u8) {
            Ok(_) => legal += 1,
            Err(e) => assert!(matches!(e, EnrollmentError::InvalidMode(_))),
        }
    }
    assert_eq!(legal, 14);
}
