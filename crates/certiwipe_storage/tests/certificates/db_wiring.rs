#![forbid(unsafe_code)]

use certiwipe_contracts::certificate::{
    CertificateId, CertificateRecord, ContentId, TransactionId,
};
use certiwipe_contracts::device::Imei;
use certiwipe_contracts::UnixTimeMs;
use certiwipe_storage::repo::CertificateRepo;
use certiwipe_storage::{CertiwipeStore, StorageError};

fn record(id: &str) -> CertificateRecord {
    CertificateRecord {
        certificate_id: CertificateId::new(id).unwrap(),
        content_id_json: ContentId::new(format!("Qm{id}json")).unwrap(),
        content_id_pdf: ContentId::new(format!("Qm{id}pdf")).unwrap(),
        transaction_id: TransactionId::new(format!("0x{id}")).unwrap(),
        device_model: "Pixel 7".to_string(),
        device_imei: Imei::new("123456789012345").unwrap(),
        device_serial: "SN-1".to_string(),
        timestamp: UnixTimeMs(1_700_000_000_000),
    }
}

#[test]
fn at_cert_db_01_insert_and_lookup() {
    let s = CertiwipeStore::new_in_memory();
    s.insert_certificate_row(record("CERT-1-AAAA")).unwrap();

    let id = CertificateId::new("CERT-1-AAAA").unwrap();
    assert_eq!(s.certificate_row(&id).unwrap(), Some(record("CERT-1-AAAA")));
    assert_eq!(
        s.certificate_row(&CertificateId::new("CERT-2-BBBB").unwrap())
            .unwrap(),
        None
    );
}

#[test]
fn at_cert_db_02_duplicate_certificate_id_rejected() {
    let s = CertiwipeStore::new_in_memory();
    s.insert_certificate_row(record("CERT-1-AAAA")).unwrap();

    let mut second = record("CERT-1-AAAA");
    second.device_model = "Other".to_string();
    assert_eq!(
        s.insert_certificate_row(second),
        Err(StorageError::DuplicateKey {
            table: "certificates",
            key: "CERT-1-AAAA".to_string(),
        })
    );
    assert_eq!(s.certificate_rows().unwrap().len(), 1);
    assert_eq!(s.certificate_rows().unwrap()[0].device_model, "Pixel 7");
}

#[test]
fn at_cert_db_03_overwrite_is_append_only_violation() {
    let s = CertiwipeStore::new_in_memory();
    s.insert_certificate_row(record("CERT-1-AAAA")).unwrap();
    assert_eq!(
        s.attempt_overwrite_certificate_row(record("CERT-1-AAAA")),
        Err(StorageError::AppendOnlyViolation {
            table: "certificates"
        })
    );
}
