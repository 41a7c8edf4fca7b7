//! Whole-file encrypt → decrypt against the in-process custodian.

use std::collections::BTreeMap;

use secrecy::ExposeSecret;
use zkenv_client::{MemoryTokenService, TokenService};
use zkenv_core::{KnownHalf, Protocol, Resolution, TokenPair, ZkenvError, ZkenvResult};
use zkenv_crypto::Pin;
use zkenv_engine::record::{parse_encrypted, EncLine};
use zkenv_engine::{
    decrypt_file_with, encrypt_file_with, DecryptOptions, DecryptReport, Decryptor, Deletion,
    EncryptOptions, Encryptor, FixedPin, LineOutcome, RecordOutcome, ReportStatus,
};

fn pin(s: &str) -> Pin {
    Pin::parse(s).unwrap()
}

fn options(protocol: Protocol, multi_use: bool) -> EncryptOptions {
    EncryptOptions {
        protocol,
        multi_use,
        ..EncryptOptions::default()
    }
}

fn plain(report: &DecryptReport) -> BTreeMap<String, String> {
    report
        .secrets()
        .into_iter()
        .map(|(k, v)| (k, v.expose_secret().to_string()))
        .collect()
}

async fn encrypt(
    svc: &MemoryTokenService,
    src: &str,
    opts: EncryptOptions,
    p: Option<&Pin>,
) -> String {
    let (out, _) = Encryptor::new(svc.clone(), opts)
        .encrypt_str(src, p)
        .await
        .unwrap();
    out
}

async fn decrypt(svc: &MemoryTokenService, enc: &str, p: Option<&Pin>) -> DecryptReport {
    Decryptor::new(svc.clone(), DecryptOptions::default())
        .decrypt_str(enc, p)
        .await
}

#[tokio::test]
async fn stripe_key_single_use_scenario() {
    let svc = MemoryTokenService::new();
    let enc = encrypt(
        &svc,
        "STRIPE_KEY=sk_test_123\n",
        options(Protocol::PinV2, false),
        Some(&pin("123456")),
    )
    .await;

    let records: Vec<&str> = enc.lines().collect();
    assert_eq!(records.len(), 1);
    assert!(records[0].starts_with("STRIPE_KEY_ENC="));
    let value = records[0].trim_start_matches("STRIPE_KEY_ENC=");
    let (reference, envelope) = value.split_once(':').unwrap();
    assert_eq!(reference.len(), 43, "reference is a 32-byte base64url token");
    assert!(!envelope.is_empty());

    let first = decrypt(&svc, &enc, Some(&pin("123456"))).await;
    assert_eq!(
        plain(&first),
        BTreeMap::from([("STRIPE_KEY".to_string(), "sk_test_123".to_string())])
    );
    assert_eq!(first.status(), ReportStatus::Complete);
    assert!(matches!(
        first.outcomes[0],
        RecordOutcome::Recovered {
            deletion: Deletion::Deleted,
            ..
        }
    ));

    let second = decrypt(&svc, &enc, Some(&pin("999999"))).await;
    assert!(second.secrets().is_empty());
    assert_eq!(second.missing(), vec!["STRIPE_KEY"]);
    assert!(matches!(
        second.outcomes[0],
        RecordOutcome::Failed {
            error: ZkenvError::TokenNotFound,
            ..
        }
    ));
    assert_eq!(second.status(), ReportStatus::Failed);
}

#[tokio::test]
async fn wrong_pin_does_not_destroy_the_token() {
    let svc = MemoryTokenService::new();
    let enc = encrypt(
        &svc,
        "DB_PASSWORD=hunter2\n",
        options(Protocol::PinV2, false),
        Some(&pin("123456")),
    )
    .await;

    let wrong = decrypt(&svc, &enc, Some(&pin("000000"))).await;
    assert!(wrong.secrets().is_empty());
    assert!(matches!(
        wrong.outcomes[0],
        RecordOutcome::Failed {
            error: ZkenvError::Authentication,
            ..
        }
    ));
    assert_eq!(svc.calls().delete, 0);
    assert_eq!(svc.live_pairs(), 1);

    let right = decrypt(&svc, &enc, Some(&pin("123456"))).await;
    assert_eq!(right.get("DB_PASSWORD").unwrap().expose_secret(), "hunter2");
    assert_eq!(svc.calls().delete, 1);
    assert_eq!(svc.live_pairs(), 0);
}

#[tokio::test]
async fn multi_use_survives_repeated_decrypts() {
    let svc = MemoryTokenService::new();
    let enc = encrypt(
        &svc,
        "API_KEY=abc\n",
        options(Protocol::PinV2, true),
        Some(&pin("424242")),
    )
    .await;

    for _ in 0..3 {
        let report = decrypt(&svc, &enc, Some(&pin("424242"))).await;
        assert_eq!(report.get("API_KEY").unwrap().expose_secret(), "abc");
        assert!(matches!(
            report.outcomes[0],
            RecordOutcome::Recovered {
                deletion: Deletion::NotRequested,
                ..
            }
        ));
    }
    assert_eq!(svc.calls().delete, 0);
    assert_eq!(svc.live_pairs(), 1);
}

#[tokio::test]
async fn pair_protocol_roundtrip_and_consumption() {
    let svc = MemoryTokenService::new();
    let enc = encrypt(&svc, "A=1\nB=two=2\n", options(Protocol::PairV1, false), None).await;
    assert!(enc.lines().all(|l| l.contains("_ENC=v1.")));

    let report = decrypt(&svc, &enc, None).await;
    assert_eq!(
        plain(&report),
        BTreeMap::from([
            ("A".to_string(), "1".to_string()),
            ("B".to_string(), "two=2".to_string())
        ])
    );
    assert_eq!(svc.live_pairs(), 0);

    let again = decrypt(&svc, &enc, None).await;
    assert!(again.secrets().is_empty());
}

#[tokio::test]
async fn comments_and_blanks_are_preserved_in_order() {
    let svc = MemoryTokenService::new();
    let src = "# payment provider\nSTRIPE_KEY=sk_test_123\n\n\
               # database\nDB_URL=postgres://localhost/db\nNOT A VARIABLE\n";
    let enc = encrypt(&svc, src, options(Protocol::PinV2, false), Some(&pin("123456"))).await;

    let lines: Vec<&str> = enc.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], "# payment provider");
    assert!(lines[1].starts_with("STRIPE_KEY_ENC="));
    assert_eq!(lines[2], "");
    assert_eq!(lines[3], "# database");
    assert!(lines[4].starts_with("DB_URL_ENC="));
    assert_eq!(lines[5], "NOT A VARIABLE");
}

#[tokio::test]
async fn output_order_survives_concurrency() {
    let svc = MemoryTokenService::new();
    let src: String = (0..40).map(|i| format!("VAR_{i:02}=value-{i}\n")).collect();
    let opts = EncryptOptions {
        concurrency: 16,
        ..options(Protocol::PairV1, true)
    };
    let enc = encrypt(&svc, &src, opts, None).await;

    let names: Vec<&str> = enc
        .lines()
        .map(|l| l.split("_ENC=").next().unwrap())
        .collect();
    let expected: Vec<String> = (0..40).map(|i| format!("VAR_{i:02}")).collect();
    assert_eq!(names, expected);

    let report = Decryptor::new(svc.clone(), DecryptOptions { concurrency: 16 })
        .decrypt_str(&enc, None)
        .await;
    let recovered: Vec<&str> = report.outcomes.iter().map(RecordOutcome::name).collect();
    assert_eq!(recovered, expected);
}

#[tokio::test]
async fn same_value_gets_distinct_envelopes() {
    let svc = MemoryTokenService::new();
    let enc = encrypt(
        &svc,
        "A=same\nB=same\n",
        options(Protocol::PinV2, false),
        Some(&pin("123456")),
    )
    .await;

    let records: Vec<_> = parse_encrypted(&enc)
        .into_iter()
        .map(|l| match l {
            EncLine::Record(r) => r,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_ne!(records[0].reference, records[1].reference);
    assert_ne!(records[0].envelope.nonce(), records[1].envelope.nonce());
    assert_ne!(
        records[0].envelope.ciphertext_and_tag(),
        records[1].envelope.ciphertext_and_tag()
    );
}

#[tokio::test]
async fn issue_failure_writes_error_marker() {
    let svc = MemoryTokenService::new();
    svc.set_available(false);
    let (out, report) = Encryptor::new(svc.clone(), options(Protocol::PinV2, false))
        .encrypt_str("# keep\nSECRET=x\n", Some(&pin("123456")))
        .await
        .unwrap();

    assert_eq!(out, "# keep\n# ERROR encrypting SECRET\n");
    assert!(matches!(report.lines[0], LineOutcome::Passthrough));
    assert!(matches!(
        &report.lines[1],
        LineOutcome::Errored {
            name,
            error: ZkenvError::ServiceUnavailable(_)
        } if name == "SECRET"
    ));
    assert_eq!(report.status(), ReportStatus::Failed);
}

#[tokio::test]
async fn assignment_without_a_name_is_never_copied_in_cleartext() {
    let svc = MemoryTokenService::new();
    let (out, report) = Encryptor::new(svc.clone(), options(Protocol::PinV2, false))
        .encrypt_str(
            "# keep\n=sk_live_topsecret\n  = another_secret\nOK=fine\n",
            Some(&pin("123456")),
        )
        .await
        .unwrap();

    assert!(!out.contains("sk_live_topsecret"));
    assert!(!out.contains("another_secret"));
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "# keep");
    assert_eq!(lines[1], "# ERROR encrypting line 2");
    assert_eq!(lines[2], "# ERROR encrypting line 3");
    assert!(lines[3].starts_with("OK_ENC="));

    let errored: Vec<&str> = report.errored().map(|(name, _)| name).collect();
    assert_eq!(errored, vec!["line 2", "line 3"]);
    assert!(report
        .errored()
        .all(|(_, e)| matches!(e, ZkenvError::MalformedRecord(_))));
    assert_eq!(report.status(), ReportStatus::Partial);
    assert_eq!(svc.calls().issue, 1);
}

#[tokio::test]
async fn file_of_only_nameless_assignments_fails() {
    let svc = MemoryTokenService::new();
    let (out, report) = Encryptor::new(svc.clone(), options(Protocol::PinV2, false))
        .encrypt_str("=sk_live_topsecret\n", Some(&pin("123456")))
        .await
        .unwrap();

    assert_eq!(out, "# ERROR encrypting line 1\n");
    assert_eq!(report.status(), ReportStatus::Failed);
    assert_eq!(svc.calls().issue, 0);
}

#[tokio::test]
async fn resolve_failure_yields_partial_result() {
    let svc = MemoryTokenService::new();
    let enc = encrypt(
        &svc,
        "A=1\nB=2\n",
        options(Protocol::PinV2, true),
        Some(&pin("123456")),
    )
    .await;

    // Forget B's pair on the custodian side.
    let b_ref = match &parse_encrypted(&enc)[1] {
        EncLine::Record(r) => r.reference.clone(),
        other => panic!("unexpected {other:?}"),
    };
    svc.delete(&b_ref).await.unwrap();

    let report = decrypt(&svc, &enc, Some(&pin("123456"))).await;
    assert_eq!(plain(&report), BTreeMap::from([("A".to_string(), "1".to_string())]));
    assert_eq!(report.missing(), vec!["B"]);
    assert_eq!(report.status(), ReportStatus::Partial);
}

#[tokio::test]
async fn malformed_records_never_reach_the_custodian() {
    let svc = MemoryTokenService::new();
    let enc = "# comment\nPLAIN=ignored\nBROKEN_ENC=no-separator\nALSO_ENC=v7.abc:AAAA\n";

    let report = decrypt(&svc, enc, Some(&pin("123456"))).await;
    assert_eq!(report.outcomes.len(), 2);
    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o, RecordOutcome::SkippedMalformed { .. })));
    assert_eq!(svc.calls().resolve, 0);
    assert_eq!(report.status(), ReportStatus::Failed);
}

#[tokio::test]
async fn missing_pin_skips_pin_records_without_resolving() {
    let svc = MemoryTokenService::new();
    let pin_enc = encrypt(
        &svc,
        "P=pin-value\n",
        options(Protocol::PinV2, true),
        Some(&pin("123456")),
    )
    .await;
    let pair_enc = encrypt(&svc, "Q=pair-value\n", options(Protocol::PairV1, true), None).await;
    let resolves_before = svc.calls().resolve;

    let report = decrypt(&svc, &format!("{pin_enc}{pair_enc}"), None).await;
    assert!(matches!(
        report.outcomes[0],
        RecordOutcome::Failed {
            error: ZkenvError::PinRequired,
            ..
        }
    ));
    assert_eq!(report.get("Q").unwrap().expose_secret(), "pair-value");
    assert_eq!(svc.calls().resolve, resolves_before + 1);
}

/// Custodian whose delete endpoint is broken.
#[derive(Clone)]
struct FailingDelete(MemoryTokenService);

impl TokenService for FailingDelete {
    async fn issue(&self, multi_use: bool) -> ZkenvResult<TokenPair> {
        self.0.issue(multi_use).await
    }

    async fn resolve(&self, known: &KnownHalf) -> ZkenvResult<Resolution> {
        self.0.resolve(known).await
    }

    async fn delete(&self, _token_b: &str) -> ZkenvResult<()> {
        Err(ZkenvError::ServiceUnavailable("delete endpoint down".into()))
    }
}

#[tokio::test]
async fn delete_failure_keeps_recovered_value() {
    let svc = MemoryTokenService::new();
    let enc = encrypt(
        &svc,
        "TOKEN=value\n",
        options(Protocol::PinV2, false),
        Some(&pin("123456")),
    )
    .await;

    let report = Decryptor::new(FailingDelete(svc.clone()), DecryptOptions::default())
        .decrypt_str(&enc, Some(&pin("123456")))
        .await;
    assert_eq!(report.get("TOKEN").unwrap().expose_secret(), "value");
    assert!(matches!(
        report.outcomes[0],
        RecordOutcome::Recovered {
            deletion: Deletion::Failed(_),
            ..
        }
    ));
    assert_eq!(report.status(), ReportStatus::Complete);
    assert_eq!(svc.live_pairs(), 1);
}

#[tokio::test]
async fn file_level_roundtrip_with_pin_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join(".env");
    let dest = dir.path().join(".zk.env");
    std::fs::write(&source, "# app\nSTRIPE_KEY=sk_test_123\n").unwrap();

    let svc = MemoryTokenService::new();
    let report = encrypt_file_with(
        svc.clone(),
        &source,
        &dest,
        options(Protocol::PinV2, false),
        None,
        &mut FixedPin::new(pin("123456")),
    )
    .await
    .unwrap();
    assert_eq!(report.status(), ReportStatus::Complete);
    assert!(std::fs::read_to_string(&dest)
        .unwrap()
        .starts_with("# app\nSTRIPE_KEY_ENC="));

    let report = decrypt_file_with(
        svc.clone(),
        &dest,
        DecryptOptions::default(),
        None,
        &mut FixedPin::new(pin("123456")),
    )
    .await
    .unwrap();
    assert_eq!(report.get("STRIPE_KEY").unwrap().expose_secret(), "sk_test_123");
}

#[tokio::test]
async fn unreadable_source_writes_nothing_and_never_prompts() {
    struct NoPrompt;
    impl zkenv_engine::PinSource for NoPrompt {
        fn pin(&mut self, _: zkenv_engine::PinPurpose) -> ZkenvResult<Pin> {
            panic!("must not prompt for a missing source")
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join(".zk.env");
    let svc = MemoryTokenService::new();
    let result = encrypt_file_with(
        svc.clone(),
        &dir.path().join("missing.env"),
        &dest,
        EncryptOptions::default(),
        None,
        &mut NoPrompt,
    )
    .await;

    assert!(matches!(result, Err(ZkenvError::Io(_))));
    assert!(!dest.exists());
    assert_eq!(svc.calls().issue, 0);
}

#[tokio::test]
async fn pair_only_file_never_asks_for_a_pin() {
    struct NoPrompt;
    impl zkenv_engine::PinSource for NoPrompt {
        fn pin(&mut self, _: zkenv_engine::PinPurpose) -> ZkenvResult<Pin> {
            panic!("pair-only records need no PIN")
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".zk.env");
    let svc = MemoryTokenService::new();
    let enc = encrypt(&svc, "A=1\n", options(Protocol::PairV1, false), None).await;
    std::fs::write(&path, enc).unwrap();

    let report = decrypt_file_with(svc, &path, DecryptOptions::default(), None, &mut NoPrompt)
        .await
        .unwrap();
    assert_eq!(report.get("A").unwrap().expose_secret(), "1");
}
