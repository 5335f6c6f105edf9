mod common;

use std::collections::HashMap;
use std::sync::Arc;

use qumail_core::{
    Attachment, CryptoService, DecryptionError, EncryptRequest, EncryptionError, EncryptionMethod,
    Envelope, Payload, QuMailError, SecurityLevel,
};
use qumail_crypto::pq;
use qumail_keys::{
    HashChain, KeyDerivation, MemoryMetadataStore, MetadataStore, QuantumKeyError,
    QuantumKeySimulator,
};

fn sample_payload() -> Payload {
    Payload::new("Quarterly numbers attached. Do not forward.")
        .with_attachment(Attachment::new("q3.csv", b"region,total\nnorth,42\n".to_vec()))
        .with_attachment(Attachment::new("logo.png", vec![0x89, 0x50, 0x4e, 0x47, 0, 255]))
}

fn flip_ciphertext(envelope: &mut Envelope) {
    match envelope {
        Envelope::Hybrid { sealed, .. } | Envelope::KeyDerived { sealed, .. } => {
            sealed.ciphertext[0] ^= 0x01
        }
        _ => panic!("not an AEAD envelope"),
    }
}

fn flip_tag(envelope: &mut Envelope) {
    match envelope {
        Envelope::Hybrid { sealed, .. } | Envelope::KeyDerived { sealed, .. } => {
            sealed.tag[15] ^= 0x80
        }
        _ => panic!("not an AEAD envelope"),
    }
}

#[tokio::test]
async fn test_plaintext_carries_hello_unchanged() {
    let pair = common::pair();
    let request = EncryptRequest::new(SecurityLevel::Plaintext, Payload::new("hello"));

    let json = pair.sender.encrypt_to_json(&request).await.unwrap();
    assert!(json.contains(r#""security_level":4"#));
    assert!(json.contains(r#""body":"hello""#));

    let payload = pair.receiver.decrypt_json(&json, None).await.unwrap();
    assert_eq!(payload.body, "hello");
    assert!(payload.attachments.is_empty());
}

#[tokio::test]
async fn test_every_level_and_method_roundtrips() {
    let recipient = pq::keygen();
    let cases = [
        (SecurityLevel::Plaintext, EncryptionMethod::Qkd),
        (SecurityLevel::Hybrid, EncryptionMethod::Qkd),
        (SecurityLevel::KeyDerived, EncryptionMethod::Qkd),
        (SecurityLevel::KeyDerived, EncryptionMethod::Pqc),
        (SecurityLevel::OneTimePad, EncryptionMethod::Qkd),
        (SecurityLevel::OneTimePad, EncryptionMethod::Pqc),
    ];

    for (level, method) in cases {
        let pair = common::pair();
        let request = EncryptRequest::new(level, sample_payload())
            .method(method)
            .recipient_public_key(recipient.public_key.clone())
            .recipient_id("bob@example.org");

        let json = pair.sender.encrypt_to_json(&request).await.unwrap();
        let payload = pair
            .receiver
            .decrypt_json(&json, Some(recipient.private_key()))
            .await
            .unwrap_or_else(|e| panic!("level {} / {}: {}", level, method, e));
        assert_eq!(payload, sample_payload(), "level {} / {}", level, method);
    }
}

#[tokio::test]
async fn test_envelope_fields_per_level() {
    let pair = common::pair();
    let recipient = pq::keygen();

    let hybrid = pair
        .sender
        .encrypt(
            &EncryptRequest::new(SecurityLevel::Hybrid, sample_payload())
                .recipient_public_key(recipient.public_key.clone()),
        )
        .await
        .unwrap();
    let json = hybrid.to_json().unwrap();
    for field in ["kem_ciphertext", "wrapped_key", "nonce", "tag", "ciphertext"] {
        assert!(json.contains(field), "missing {}", field);
    }
    assert!(!json.contains("key_id"));
    assert!(!json.contains("Quarterly"));

    let qkd = pair
        .sender
        .encrypt(&EncryptRequest::new(SecurityLevel::KeyDerived, sample_payload()))
        .await
        .unwrap();
    assert!(qkd.to_json().unwrap().contains(r#""salt":"#));
    assert!(qkd.key_id().unwrap().starts_with("qkd_"));

    let pqc = pair
        .sender
        .encrypt(
            &EncryptRequest::new(SecurityLevel::KeyDerived, sample_payload())
                .method(EncryptionMethod::Pqc),
        )
        .await
        .unwrap();
    assert!(!pqc.to_json().unwrap().contains("salt"));
    assert_eq!(pqc.method(), Some(EncryptionMethod::Pqc));
}

#[tokio::test]
async fn test_tampering_detected_at_level_two() {
    let pair = common::pair();
    let envelope = pair
        .sender
        .encrypt(&EncryptRequest::new(SecurityLevel::KeyDerived, sample_payload()))
        .await
        .unwrap();

    let mut bad_ciphertext = envelope.clone();
    flip_ciphertext(&mut bad_ciphertext);
    let err = pair.receiver.decrypt(&bad_ciphertext, None).await.unwrap_err();
    assert!(matches!(err, DecryptionError::Tampered));
    assert_eq!(err.to_string(), "tamper detected");

    let mut bad_tag = envelope.clone();
    flip_tag(&mut bad_tag);
    assert!(matches!(
        pair.receiver.decrypt(&bad_tag, None).await,
        Err(DecryptionError::Tampered)
    ));

    // The untouched envelope still opens; quantum keys are re-derivable.
    assert_eq!(
        pair.receiver.decrypt(&envelope, None).await.unwrap(),
        sample_payload()
    );
}

#[tokio::test]
async fn test_level_two_work_factor_travels_with_envelope() {
    let key_manager = Arc::new(common::OneShotKeys::default());
    let metadata = Arc::new(MemoryMetadataStore::new());
    let service = |iterations| {
        CryptoService::new(
            key_manager.clone(),
            Arc::new(QuantumKeySimulator::new(metadata.clone())),
        )
        .with_kdf_iterations(iterations)
    };
    let sender = service(1_000);
    let receiver = service(2_000);

    let envelope = sender
        .encrypt(&EncryptRequest::new(SecurityLevel::KeyDerived, sample_payload()))
        .await
        .unwrap();
    let json = envelope.to_json().unwrap();
    assert!(json.contains(r#""kdf_iterations":1000"#));

    assert_eq!(
        receiver.decrypt_json(&json, None).await.unwrap(),
        sample_payload()
    );
}

#[tokio::test]
async fn test_tampering_detected_at_level_two_key_manager() {
    let pair = common::pair();
    let mut envelope = pair
        .sender
        .encrypt(
            &EncryptRequest::new(SecurityLevel::KeyDerived, sample_payload())
                .method(EncryptionMethod::Pqc),
        )
        .await
        .unwrap();
    flip_tag(&mut envelope);

    assert!(matches!(
        pair.receiver.decrypt(&envelope, None).await,
        Err(DecryptionError::Tampered)
    ));
}

#[tokio::test]
async fn test_tampering_detected_at_level_three() {
    let pair = common::pair();
    let recipient = pq::keygen();
    let envelope = pair
        .sender
        .encrypt(
            &EncryptRequest::new(SecurityLevel::Hybrid, sample_payload())
                .recipient_public_key(recipient.public_key.clone()),
        )
        .await
        .unwrap();

    for flip in [flip_ciphertext, flip_tag] {
        let mut tampered = envelope.clone();
        flip(&mut tampered);
        assert!(matches!(
            pair.receiver
                .decrypt(&tampered, Some(recipient.private_key()))
                .await,
            Err(DecryptionError::Tampered)
        ));
    }
}

#[tokio::test]
async fn test_hybrid_with_other_private_key_is_tamper() {
    let pair = common::pair();
    let recipient = pq::keygen();
    let intruder = pq::keygen();

    let envelope = pair
        .sender
        .encrypt(
            &EncryptRequest::new(SecurityLevel::Hybrid, Payload::new("for bob only"))
                .recipient_public_key(recipient.public_key.clone()),
        )
        .await
        .unwrap();

    assert_eq!(
        pair.receiver
            .decrypt(&envelope, Some(recipient.private_key()))
            .await
            .unwrap()
            .body,
        "for bob only"
    );

    let err = pair
        .receiver
        .decrypt(&envelope, Some(intruder.private_key()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "tamper detected");
}

#[tokio::test]
async fn test_hybrid_without_private_key() {
    let pair = common::pair();
    let recipient = pq::keygen();
    let envelope = pair
        .sender
        .encrypt(
            &EncryptRequest::new(SecurityLevel::Hybrid, sample_payload())
                .recipient_public_key(recipient.public_key.clone()),
        )
        .await
        .unwrap();

    for missing in [None, Some(&[][..])] {
        let err = pair.receiver.decrypt(&envelope, missing).await.unwrap_err();
        assert!(matches!(err, DecryptionError::MissingKeyMaterial));
        assert_eq!(err.to_string(), "missing key material");
    }
}

#[tokio::test]
async fn test_hybrid_recipient_lookup() {
    let recipient = pq::keygen();
    let directory = common::StaticDirectory {
        keys: HashMap::from([("bob@example.org".to_string(), recipient.public_key.clone())]),
    };
    let key_manager = Arc::new(common::OneShotKeys::default());
    let quantum = Arc::new(QuantumKeySimulator::new(Arc::new(MemoryMetadataStore::new())));
    let service = CryptoService::new(key_manager, quantum).with_directory(Arc::new(directory));

    let envelope = service
        .encrypt(&EncryptRequest::new(SecurityLevel::Hybrid, sample_payload()).recipient_id("bob@example.org"))
        .await
        .unwrap();
    assert_eq!(
        service
            .decrypt(&envelope, Some(recipient.private_key()))
            .await
            .unwrap(),
        sample_payload()
    );

    assert!(matches!(
        service
            .encrypt(&EncryptRequest::new(SecurityLevel::Hybrid, sample_payload()).recipient_id("eve@example.org"))
            .await,
        Err(EncryptionError::MissingRecipientKey(id)) if id == "eve@example.org"
    ));
}

#[tokio::test]
async fn test_hybrid_needs_a_recipient() {
    let pair = common::pair();
    // A recipient id alone is not enough without a directory.
    let request = EncryptRequest::new(SecurityLevel::Hybrid, sample_payload()).recipient_id("bob");
    assert!(matches!(
        pair.sender.encrypt(&request).await,
        Err(EncryptionError::NoRecipient)
    ));

    let malformed = EncryptRequest::new(SecurityLevel::Hybrid, sample_payload())
        .recipient_public_key(vec![1, 2, 3]);
    assert!(matches!(
        pair.sender.encrypt(&malformed).await,
        Err(EncryptionError::Kem(_))
    ));
}

#[tokio::test]
async fn test_key_manager_keys_are_single_use() {
    let pair = common::pair();

    for level in [SecurityLevel::KeyDerived, SecurityLevel::OneTimePad] {
        let envelope = pair
            .sender
            .encrypt(&EncryptRequest::new(level, sample_payload()).method(EncryptionMethod::Pqc))
            .await
            .unwrap();
        assert_eq!(pair.key_manager.outstanding(), 1);

        assert_eq!(
            pair.receiver.decrypt(&envelope, None).await.unwrap(),
            sample_payload()
        );
        assert_eq!(pair.key_manager.outstanding(), 0);

        assert!(matches!(
            pair.receiver.decrypt(&envelope, None).await,
            Err(DecryptionError::KeyNotFound(id)) if Some(id.as_str()) == envelope.key_id()
        ));
    }
}

#[tokio::test]
async fn test_one_time_pad_key_covers_payload() {
    let pair = common::pair();
    for method in [EncryptionMethod::Qkd, EncryptionMethod::Pqc] {
        let payload = sample_payload();
        let envelope = pair
            .sender
            .encrypt(&EncryptRequest::new(SecurityLevel::OneTimePad, payload.clone()).method(method))
            .await
            .unwrap();
        match &envelope {
            Envelope::OneTimePad { ciphertext, .. } => {
                assert_eq!(ciphertext.len(), payload.to_bytes().unwrap().len())
            }
            other => panic!("unexpected envelope {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_short_key_source_fails_before_masking() {
    let quantum = Arc::new(QuantumKeySimulator::new(Arc::new(MemoryMetadataStore::new())));
    let service = CryptoService::new(Arc::new(common::ShortKeys { short_by: 1 }), quantum);

    let request =
        EncryptRequest::new(SecurityLevel::OneTimePad, sample_payload()).method(EncryptionMethod::Pqc);
    let needed = sample_payload().to_bytes().unwrap().len();
    match service.encrypt(&request).await {
        Err(EncryptionError::KeyTooShort { needed: n, available }) => {
            assert_eq!(n, needed);
            assert_eq!(available, needed - 1);
        }
        other => panic!("expected KeyTooShort, got {:?}", other),
    }

    let level_two =
        EncryptRequest::new(SecurityLevel::KeyDerived, sample_payload()).method(EncryptionMethod::Pqc);
    assert!(matches!(
        service.encrypt(&level_two).await,
        Err(EncryptionError::KeyTooShort { needed: 32, available: 31 })
    ));
}

#[tokio::test]
async fn test_quantum_capacity_is_an_encryption_error() {
    let quantum = Arc::new(
        QuantumKeySimulator::new(Arc::new(MemoryMetadataStore::new())).with_max_key_bytes(64),
    );
    let service = CryptoService::new(Arc::new(common::OneShotKeys::default()), quantum);

    let request = EncryptRequest::new(SecurityLevel::OneTimePad, Payload::new("x".repeat(500)));
    assert!(matches!(
        service.encrypt(&request).await,
        Err(EncryptionError::QuantumKey(QuantumKeyError::LengthUnavailable { max: 64, .. }))
    ));

    // Level 2 only needs 32 bytes and is unaffected.
    let level_two = EncryptRequest::new(SecurityLevel::KeyDerived, Payload::new("x".repeat(500)));
    assert!(service.encrypt(&level_two).await.is_ok());
}

#[tokio::test]
async fn test_unknown_quantum_key_id() {
    let pair = common::pair();
    let mut envelope = pair
        .sender
        .encrypt(&EncryptRequest::new(SecurityLevel::OneTimePad, sample_payload()))
        .await
        .unwrap();
    if let Envelope::OneTimePad { key_id, .. } = &mut envelope {
        *key_id = "qkd_ffffffffffffffffffffffffffffffff".to_string();
    }

    assert!(matches!(
        pair.receiver.decrypt(&envelope, None).await,
        Err(DecryptionError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn test_scenario_one_time_pad_thousand_bytes() {
    let metadata = Arc::new(MemoryMetadataStore::new());
    let key_manager = Arc::new(common::OneShotKeys::default());
    let sender = CryptoService::new(
        key_manager.clone(),
        Arc::new(QuantumKeySimulator::new(metadata.clone())),
    );
    let receiver = CryptoService::new(
        key_manager,
        Arc::new(QuantumKeySimulator::new(metadata.clone())),
    );

    // {"body":"…","attachments":[]} adds 28 bytes around the body.
    let payload = Payload::new("a".repeat(972));
    assert_eq!(payload.to_bytes().unwrap().len(), 1000);

    let envelope = sender
        .encrypt(
            &EncryptRequest::new(SecurityLevel::OneTimePad, payload.clone())
                .method(EncryptionMethod::Qkd)
                .recipient_id("bob@example.org"),
        )
        .await
        .unwrap();
    let key_id = envelope.key_id().unwrap().to_string();

    let published = metadata.fetch(&key_id).await.unwrap().unwrap();
    assert_eq!(published.length_bytes, 1000);
    assert_eq!(published.recipient_hint.as_deref(), Some("bob@example.org"));

    let first = HashChain.derive(&key_id, 1000);
    let second = HashChain.derive(&key_id, 1000);
    assert_eq!(first.as_slice(), second.as_slice());

    assert_eq!(receiver.decrypt(&envelope, None).await.unwrap(), payload);
    assert_eq!(receiver.quantum().status().cached_keys, 1);
}

#[tokio::test]
async fn test_text_entry_points_report_envelope_errors() {
    let pair = common::pair();
    assert!(matches!(
        pair.receiver.decrypt_json("{", None).await,
        Err(QuMailError::Envelope(_))
    ));
    assert!(matches!(
        pair.receiver
            .decrypt_json(
                r#"{"qumail_version":"4.0","security_level":1,"encryption_method":"pqc","key_id":"km-404","ciphertext":"AAEC"}"#,
                None
            )
            .await,
        Err(QuMailError::Decryption(DecryptionError::KeyNotFound(_)))
    ));
}
