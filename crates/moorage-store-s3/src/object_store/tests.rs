// crates/moorage-store-s3/src/object_store/tests.rs
// ============================================================================
// Module: S3 Object Store Unit Tests
// Description: Tests for header derivation and response normalization.
// Purpose: Validate the pure request-shaping helpers without a live bucket.
// ============================================================================

#![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

use aws_sdk_s3::types::BucketLocationConstraint;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::Digest;
use md5::Md5;
use moorage_core::SseKey;
use moorage_core::backend::ObjectStoreError;

use super::DEFAULT_REGION;
use super::missing_version;
use super::region_of;
use super::sse_headers;

#[test]
fn sse_headers_carry_the_key_and_its_digest() {
    let key = SseKey::new([0x42; 32]);
    let headers = sse_headers(&key);

    let decoded = BASE64.decode(&headers.key).expect("valid base64");
    assert_eq!(decoded, key.as_bytes());

    let digest = BASE64.decode(&headers.digest).expect("valid base64");
    assert_eq!(digest, Md5::digest(key.as_bytes()).to_vec());
}

#[test]
fn empty_location_constraint_means_the_default_region() {
    assert_eq!(region_of(None), DEFAULT_REGION);
    let empty = BucketLocationConstraint::from("");
    assert_eq!(region_of(Some(&empty)), DEFAULT_REGION);
}

#[test]
fn named_location_constraints_pass_through() {
    let constraint = BucketLocationConstraint::from("eu-central-1");
    assert_eq!(region_of(Some(&constraint)), "eu-central-1");
}

#[test]
fn a_write_without_a_version_id_is_a_service_error() {
    let error = missing_version("bucket", "key");
    assert!(matches!(error, ObjectStoreError::Service(_)));
}
