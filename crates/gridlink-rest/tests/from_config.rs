//! Client construction from configuration files.

use gridlink_common_config::{ConfigError, ConfigLoader, GridlinkConfig};
use gridlink_rest::{RestClient, RestError};
use gridlink_test_utils::{assert_err, temp_dir, temp_file};
use std::fs;

#[test]
fn missing_identity_is_a_configuration_error() {
    let ca = temp_dir();
    let mut config = GridlinkConfig::default();
    config.transport.client_cert = Some(ca.path().join("x509up_u1000"));
    config.transport.ca_cert_dir = Some(ca.path().to_path_buf());

    let err = assert_err!(RestClient::from_config(&config));
    assert!(err.is_configuration());
    assert!(matches!(err, RestError::ReadPem { .. }));
}

#[test]
fn explicit_ca_dir_must_exist() {
    let (_dir, cert) = temp_file("usercert.pem", "not really a certificate");
    let mut config = GridlinkConfig::default();
    config.transport.client_cert = Some(cert);
    config.transport.ca_cert_dir = Some("/no/such/grid-security/certificates".into());

    let err = assert_err!(RestClient::from_config(&config));
    assert!(matches!(
        err,
        RestError::Config(ConfigError::ValidationError { .. })
    ));
}

#[test]
fn garbage_identity_is_rejected_before_any_request() {
    let dir = temp_dir();
    let ca = dir.path().join("certificates");
    fs::create_dir(&ca).unwrap();
    let cert = dir.path().join("usercert.pem");
    fs::write(&cert, "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n").unwrap();

    let yaml = format!(
        "server:\n  host: cmsweb.cern.ch\ntransport:\n  client_cert: {}\n  ca_cert_dir: {}\n",
        cert.display(),
        ca.display()
    );
    let config_dir = temp_dir();
    let config_path = config_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = ConfigLoader::new(config_dir.path())
        .load_file(&config_path)
        .unwrap();
    assert_eq!(config.server.service, "crabserver");

    let err = assert_err!(RestClient::from_config(&config));
    assert!(err.is_configuration(), "unexpected error: {err}");
}

#[test]
fn unresolvable_ca_dir_fails_before_the_client_exists() {
    let (dir, cert) = temp_file("x509up_u1000", "unused");
    let missing = dir.path().join("grid-security").join("certificates");
    let mut config = GridlinkConfig::default();
    config.transport.client_cert = Some(cert);

    let err = assert_err!(RestClient::from_config_with(&config, None, &missing));
    assert!(err.is_configuration());
    match err {
        RestError::Config(ConfigError::CaCertPathNotFound { var, default }) => {
            assert_eq!(var, "X509_CERT_DIR");
            assert_eq!(default, missing);
        }
        other => panic!("Expected CaCertPathNotFound, got {other:?}"),
    }
}

#[test]
fn cert_dir_variable_naming_nothing_falls_through_to_the_default() {
    let (dir, cert) = temp_file("x509up_u1000", "unused");
    let missing = dir.path().join("certificates");
    let mut config = GridlinkConfig::default();
    config.transport.client_cert = Some(cert);

    let err = assert_err!(RestClient::from_config_with(
        &config,
        Some("/no/such/x509/dir".to_string()),
        &missing,
    ));
    assert!(matches!(
        err,
        RestError::Config(ConfigError::CaCertPathNotFound { .. })
    ));
}
