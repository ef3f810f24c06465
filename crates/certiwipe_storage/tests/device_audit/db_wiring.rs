#![forbid(unsafe_code)]

use certiwipe_contracts::certificate::{CertificateId, TransactionId};
use certiwipe_contracts::device::{DeviceStatus, ErasureEvent, Imei};
use certiwipe_contracts::{UnixTimeMs, Validate};
use certiwipe_storage::repo::DeviceAuditRepo;
use certiwipe_storage::{CertiwipeStore, StorageError};

fn erasure(cert: &str, at: u64, method: &str, passes: u32) -> ErasureEvent {
    ErasureEvent {
        certificate_id: CertificateId::new(cert).unwrap(),
        timestamp: UnixTimeMs(at),
        method: method.to_string(),
        compliance: "NIST SP 800-88 Rev.1".to_string(),
        passes,
        duration_seconds: 600,
        transaction_id: TransactionId::new(format!("0xtx-{cert}")).unwrap(),
        verified: true,
    }
}

#[test]
fn at_audit_db_01_two_erasures_same_imei_append_in_order() {
    let s = CertiwipeStore::new_in_memory();
    let imei = Imei::new("123456789012345").unwrap();

    s.record_erasure_row(
        UnixTimeMs(1_000),
        &imei,
        "Galaxy S21",
        "R58N",
        erasure("CERT-1000-AAAA", 1_000, "NIST-800-88, 1 pass", 1),
    )
    .unwrap();
    let rec = s
        .record_erasure_row(
            UnixTimeMs(2_000),
            &imei,
            "Galaxy S21",
            "R58N",
            erasure("CERT-2000-BBBB", 2_000, "DoD-5220, 3 passes", 3),
        )
        .unwrap();

    assert_eq!(rec.erasure_count(), 2);
    assert_eq!(rec.erasure_history().len(), 2);
    assert_eq!(rec.erasure_history()[0].method, "NIST-800-88, 1 pass");
    assert_eq!(rec.erasure_history()[1].method, "DoD-5220, 3 passes");
    assert_eq!(rec.first_seen(), UnixTimeMs(1_000));
    assert_eq!(rec.last_erasure(), UnixTimeMs(2_000));
    assert_eq!(rec.status(), DeviceStatus::Active);

    let latest_first = rec.history_latest_first();
    assert_eq!(latest_first[0].certificate_id.as_str(), "CERT-2000-BBBB");
    assert_eq!(
        s.device_row(&imei).unwrap().unwrap().erasure_history()[0]
            .certificate_id
            .as_str(),
        "CERT-1000-AAAA"
    );
}

#[test]
fn at_audit_db_02_first_seen_model_and_serial_are_pinned() {
    let s = CertiwipeStore::new_in_memory();
    let imei = Imei::new("490154203237518").unwrap();

    s.record_erasure_row(
        UnixTimeMs(10),
        &imei,
        "Pixel 6",
        "SN-ORIGINAL",
        erasure("CERT-10-AAAA", 10, "NIST-800-88", 1),
    )
    .unwrap();
    let rec = s
        .record_erasure_row(
            UnixTimeMs(20),
            &imei,
            "Pixel 6 Pro",
            "SN-OTHER",
            erasure("CERT-20-BBBB", 20, "NIST-800-88", 1),
        )
        .unwrap();

    assert_eq!(rec.device_model(), "Pixel 6");
    assert_eq!(rec.serial_number(), "SN-ORIGINAL");
    assert_eq!(rec.erasure_count(), 2);
}

#[test]
fn at_audit_db_03_status_transition_reflected_in_lookup() {
    let s = CertiwipeStore::new_in_memory();
    let imei = Imei::new("356938035643809").unwrap();
    s.record_erasure_row(
        UnixTimeMs(5),
        &imei,
        "iPhone 12",
        "F2LX",
        erasure("CERT-5-AAAA", 5, "Crypto erase", 1),
    )
    .unwrap();

    s.set_device_status_row(&imei, DeviceStatus::Retired).unwrap();
    let rec = s.device_row(&imei).unwrap().unwrap();
    assert_eq!(rec.status(), DeviceStatus::Retired);
    assert_eq!(rec.erasure_count(), 1);
}

#[test]
fn at_audit_db_04_history_is_append_only() {
    let s = CertiwipeStore::new_in_memory();
    let imei = Imei::new("356938035643810").unwrap();
    s.record_erasure_row(
        UnixTimeMs(5),
        &imei,
        "iPhone 12",
        "F2LX",
        erasure("CERT-5-AAAA", 5, "Crypto erase", 1),
    )
    .unwrap();

    assert_eq!(
        s.attempt_overwrite_erasure_event(&imei, 0, erasure("CERT-6-BBBB", 6, "Forged", 1)),
        Err(StorageError::AppendOnlyViolation {
            table: "device_tracking"
        })
    );
    assert_eq!(
        s.device_row(&imei).unwrap().unwrap().erasure_history()[0].method,
        "Crypto erase"
    );
}

#[test]
fn at_audit_db_05_concurrent_erasures_same_imei_lose_nothing() {
    let s = CertiwipeStore::new_in_memory();
    let imei = Imei::new("123456789012345").unwrap();
    let threads = 8u64;
    let per_thread = 25u64;

    std::thread::scope(|scope| {
        for t in 0..threads {
            let s = &s;
            let imei = &imei;
            scope.spawn(move || {
                for i in 0..per_thread {
                    let at = t * 1_000 + i + 1;
                    s.record_erasure_row(
                        UnixTimeMs(at),
                        imei,
                        "Pixel 7",
                        "SN",
                        erasure(&format!("CERT-{t}-{i}"), at, "NIST-800-88", 1),
                    )
                    .unwrap();
                }
            });
        }
    });

    let rec = s.device_row(&imei).unwrap().unwrap();
    assert_eq!(rec.erasure_count(), threads * per_thread);
    assert_eq!(rec.erasure_history().len() as u64, threads * per_thread);
    let mut ids: Vec<&str> = rec
        .erasure_history()
        .iter()
        .map(|e| e.certificate_id.as_str())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len() as u64, threads * per_thread);
    assert!(rec
        .erasure_history()
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(
        rec.erasure_history().last().map(|e| e.timestamp),
        Some(rec.last_erasure())
    );
    assert!(rec.validate().is_ok());
}

#[test]
fn at_audit_db_06_concurrent_erasures_distinct_imeis() {
    let s = CertiwipeStore::new_in_memory();

    std::thread::scope(|scope| {
        for t in 0..6u64 {
            let s = &s;
            scope.spawn(move || {
                let imei = Imei::new(format!("35000000000000{t}")).unwrap();
                for i in 0..10u64 {
                    s.record_erasure_row(
                        UnixTimeMs(i + 1),
                        &imei,
                        "Moto G",
                        "SN",
                        erasure(&format!("CERT-{t}-{i}"), i + 1, "NIST-800-88", 1),
                    )
                    .unwrap();
                }
            });
        }
    });

    let rows = s.device_rows().unwrap();
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|r| r.erasure_count() == 10));
}

#[test]
fn at_audit_db_07_commit_with_earlier_clock_keeps_history_chronological() {
    let s = CertiwipeStore::new_in_memory();
    let imei = Imei::new("123456789012345").unwrap();

    s.record_erasure_row(
        UnixTimeMs(200),
        &imei,
        "Pixel 7",
        "SN",
        erasure("CERT-200-BBBB", 200, "NIST-800-88", 1),
    )
    .unwrap();
    let rec = s
        .record_erasure_row(
            UnixTimeMs(100),
            &imei,
            "Pixel 7",
            "SN",
            erasure("CERT-100-AAAA", 100, "DoD-5220", 3),
        )
        .unwrap();

    let stamps: Vec<UnixTimeMs> = rec.erasure_history().iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps, vec![UnixTimeMs(200), UnixTimeMs(200)]);
    assert_eq!(rec.first_seen(), UnixTimeMs(200));
    assert_eq!(rec.last_erasure(), UnixTimeMs(200));
    assert!(rec.validate().is_ok());
    assert_eq!(
        rec.history_latest_first()[0].certificate_id.as_str(),
        "CERT-100-AAAA"
    );
}
