use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use onvif_server::Error;
use onvif_server::auth::{
    Credential, CredentialStore, DigestAlgorithm, DigestAuth, DigestParams, hash_password,
    hash_with_salt, verify_password,
};
use onvif_server::http::request::{Method, Request, RequestBuilder};

const REALM: &str = "ONVIF Server";
const TARGET: &str = "/onvif/ptz_service";

fn store() -> Arc<CredentialStore> {
    Arc::new(CredentialStore::new(vec![
        Credential {
            username: "admin".to_string(),
            password_hash: hash_with_salt("secret", &[7u8; 16]),
            active: true,
        },
        Credential {
            username: "retired".to_string(),
            password_hash: hash_with_salt("secret", &[9u8; 16]),
            active: false,
        },
    ]))
}

fn gate() -> DigestAuth {
    DigestAuth::new(REALM, Duration::from_secs(300), store())
}

fn nonce_from(challenge: &str) -> String {
    let params = DigestParams::parse(challenge.strip_prefix("Digest ").unwrap()).unwrap();
    params.get("nonce").unwrap().to_string()
}

struct Client<'a> {
    username: &'a str,
    stored: String,
    realm: &'a str,
    uri: &'a str,
    algorithm: DigestAlgorithm,
}

impl Client<'_> {
    fn admin() -> Self {
        Client {
            username: "admin",
            stored: hash_with_salt("secret", &[7u8; 16]),
            realm: REALM,
            uri: TARGET,
            algorithm: DigestAlgorithm::Md5,
        }
    }

    fn header(&self, nonce: &str, nc: &str) -> String {
        let h = |s: String| self.algorithm.hash(&s);
        let ha1 = h(format!("{}:{}:{}", self.username, self.realm, self.stored));
        let ha2 = h(format!("POST:{}", self.uri));
        let response = h(format!("{}:{}:{}:abcdef:auth:{}", ha1, nonce, nc, ha2));
        format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm={}, qop=auth, nc={}, cnonce=\"abcdef\", response=\"{}\"",
            self.username,
            self.realm,
            nonce,
            self.uri,
            self.algorithm.as_str(),
            nc,
            response
        )
    }
}

fn request_with(authorization: Option<&str>) -> Request {
    let mut builder = RequestBuilder::new()
        .method(Method::POST)
        .target(TARGET)
        .header("Host", "cam.local");
    if let Some(value) = authorization {
        builder = builder.header("Authorization", value);
    }
    builder.build().unwrap()
}

#[test]
fn test_hash_format() {
    let stored = hash_password("secret").unwrap();
    let (salt, digest) = stored.split_once('$').unwrap();

    assert_eq!(salt.len(), 32);
    assert_eq!(digest.len(), 64);
    assert!(stored.bytes().all(|b| b == b'$' || b.is_ascii_hexdigit()));
}

#[test]
fn test_hash_uses_fresh_salt() {
    assert_ne!(hash_password("secret").unwrap(), hash_password("secret").unwrap());
}

#[test]
fn test_hash_rejects_empty_password() {
    assert!(matches!(hash_password(""), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_verify_round_trip_for_all_lengths() {
    for len in 1..=256 {
        let password: String = (0..len).map(|i| char::from(b'!' + (i % 90) as u8)).collect();
        let stored = hash_password(&password).unwrap();

        assert!(verify_password(&password, &stored).is_ok(), "length {}", len);

        let mut wrong = password.clone();
        wrong.push('x');
        assert_eq!(verify_password(&wrong, &stored), Err(Error::AuthenticationFailed));
    }
}

#[test]
fn test_verify_known_vector() {
    // SHA-256("secret" || 0x07 * 16)
    let stored = hash_with_salt("secret", &[7u8; 16]);
    assert!(stored.starts_with("07070707070707070707070707070707$"));
    assert!(verify_password("secret", &stored).is_ok());
    assert_eq!(verify_password("Secret", &stored), Err(Error::AuthenticationFailed));
}

#[test]
fn test_verify_compares_hash_case_insensitively() {
    let stored = hash_with_salt("secret", &[9u8; 16]);
    let (salt, digest) = stored.split_once('$').unwrap();
    let upper = format!("{}${}", salt, digest.to_ascii_uppercase());
    assert!(verify_password("secret", &upper).is_ok());

    let mut flipped = digest.to_string();
    let last = if flipped.ends_with('0') { "1" } else { "0" };
    flipped.replace_range(63.., last);
    assert_eq!(
        verify_password("secret", &format!("{}${}", salt, flipped)),
        Err(Error::AuthenticationFailed)
    );
}

#[test]
fn test_verify_rejects_malformed_stored_values() {
    let good = hash_with_salt("secret", &[1u8; 16]);
    let (salt, digest) = good.split_once('$').unwrap();

    assert!(matches!(verify_password("secret", digest), Err(Error::ParseFailure(_))));
    assert!(matches!(
        verify_password("secret", &format!("{}${}", &salt[..30], digest)),
        Err(Error::ParseFailure(_))
    ));
    assert!(matches!(
        verify_password("secret", &format!("{}${}", "zz".repeat(16), digest)),
        Err(Error::ParseFailure(_))
    ));
}

#[test]
fn test_credential_store_lookup() {
    let store = store();
    assert!(store.lookup_active("admin").is_some());
    assert!(store.lookup_active("retired").is_none());
    assert!(store.lookup_active("nobody").is_none());

    store.replace(Vec::new());
    assert!(store.is_empty());
}

#[test]
fn test_credential_debug_hides_hash() {
    let credential = store().lookup_active("admin").unwrap();
    let debug = format!("{:?}", credential);
    assert!(!debug.contains(&credential.password_hash));
    assert!(debug.contains("admin"));
}

#[test]
fn test_challenge_format() {
    let gate = gate();
    let challenge = gate.challenge().unwrap();

    assert!(challenge.starts_with("Digest "));
    assert!(challenge.contains("realm=\"ONVIF Server\""));
    assert!(challenge.contains("qop=\"auth\""));
    assert!(challenge.contains("algorithm=MD5"));

    let nonce = nonce_from(&challenge);
    assert_eq!(nonce.len(), 32);
    assert_ne!(nonce, nonce_from(&gate.challenge().unwrap()));
}

#[test]
fn test_missing_authorization_fails() {
    assert_eq!(gate().authenticate(&request_with(None)), Err(Error::AuthenticationFailed));
}

#[test]
fn test_valid_digest_accepted() {
    let gate = gate();
    let nonce = nonce_from(&gate.challenge().unwrap());
    let header = Client::admin().header(&nonce, "00000001");

    assert_eq!(gate.authenticate(&request_with(Some(&header))).unwrap(), "admin");
}

#[test]
fn test_sha256_digest_accepted() {
    let gate = gate();
    let nonce = nonce_from(&gate.challenge().unwrap());
    let client = Client {
        algorithm: DigestAlgorithm::Sha256,
        ..Client::admin()
    };

    let header = client.header(&nonce, "00000001");
    assert!(gate.authenticate(&request_with(Some(&header))).is_ok());
}

#[test]
fn test_nonce_count_must_increase() {
    let gate = gate();
    let nonce = nonce_from(&gate.challenge().unwrap());
    let client = Client::admin();

    let first = client.header(&nonce, "00000001");
    assert!(gate.authenticate(&request_with(Some(&first))).is_ok());
    assert_eq!(
        gate.authenticate(&request_with(Some(&first))),
        Err(Error::AuthenticationFailed)
    );

    let second = client.header(&nonce, "00000002");
    assert!(gate.authenticate(&request_with(Some(&second))).is_ok());
}

#[test]
fn test_wrong_password_rejected() {
    let gate = gate();
    let nonce = nonce_from(&gate.challenge().unwrap());
    let client = Client {
        stored: hash_with_salt("guess", &[7u8; 16]),
        ..Client::admin()
    };

    let header = client.header(&nonce, "00000001");
    assert_eq!(
        gate.authenticate(&request_with(Some(&header))),
        Err(Error::AuthenticationFailed)
    );
}

#[test]
fn test_unknown_and_inactive_users_rejected() {
    let gate = gate();
    for username in ["nobody", "retired"] {
        let nonce = nonce_from(&gate.challenge().unwrap());
        let client = Client {
            username,
            ..Client::admin()
        };
        let header = client.header(&nonce, "00000001");
        assert_eq!(
            gate.authenticate(&request_with(Some(&header))),
            Err(Error::AuthenticationFailed)
        );
    }
}

#[test]
fn test_unissued_nonce_rejected() {
    let gate = gate();
    let header = Client::admin().header("00112233445566778899aabbccddeeff", "00000001");
    assert_eq!(
        gate.authenticate(&request_with(Some(&header))),
        Err(Error::AuthenticationFailed)
    );
}

#[test]
fn test_expired_nonce_rejected() {
    let gate = DigestAuth::new(REALM, Duration::from_millis(1), store());
    let nonce = nonce_from(&gate.challenge().unwrap());
    std::thread::sleep(Duration::from_millis(20));

    let header = Client::admin().header(&nonce, "00000001");
    assert_eq!(
        gate.authenticate(&request_with(Some(&header))),
        Err(Error::AuthenticationFailed)
    );
}

#[test]
fn test_uri_and_realm_must_match() {
    let gate = gate();

    let nonce = nonce_from(&gate.challenge().unwrap());
    let other_uri = Client {
        uri: "/onvif/device_service",
        ..Client::admin()
    };
    let header = other_uri.header(&nonce, "00000001");
    assert!(gate.authenticate(&request_with(Some(&header))).is_err());

    let other_realm = Client {
        realm: "elsewhere",
        ..Client::admin()
    };
    let header = other_realm.header(&nonce, "00000001");
    assert!(gate.authenticate(&request_with(Some(&header))).is_err());
}

#[test]
fn test_malformed_digest_header() {
    let gate = gate();
    for header in [
        "Digest username=\"admin\", realm=\"ONVIF Server",
        "Digest username",
        "Digest realm=\"ONVIF Server\"",
        "Digest username=\"admin\" realm=\"x\"",
    ] {
        assert!(gate.authenticate(&request_with(Some(header))).is_err(), "{}", header);
    }
}

#[test]
fn test_digest_params_quoting() {
    let params =
        DigestParams::parse(r#"username="a\"b", uri="/x,y", qop=auth, NC=00000001"#).unwrap();

    assert_eq!(params.get("username"), Some("a\"b"));
    assert_eq!(params.get("uri"), Some("/x,y"));
    assert_eq!(params.get("qop"), Some("auth"));
    assert_eq!(params.get("nc"), Some("00000001"));

    assert!(DigestParams::parse("a=1, a=2").is_err());
}

#[test]
fn test_basic_auth_only_when_enabled() {
    let credentials = base64::engine::general_purpose::STANDARD.encode("admin:secret");
    let header = format!("Basic {}", credentials);
    let request = request_with(Some(&header));

    assert!(gate().authenticate(&request).is_err());

    let gate = gate().with_basic(true);
    assert_eq!(gate.authenticate(&request).unwrap(), "admin");

    let wrong = base64::engine::general_purpose::STANDARD.encode("admin:nope");
    let request = request_with(Some(&format!("Basic {}", wrong)));
    assert_eq!(gate.authenticate(&request), Err(Error::AuthenticationFailed));
}

#[test]
fn test_outstanding_nonces_are_bounded() {
    let gate = gate();
    for _ in 0..1100 {
        gate.challenge().unwrap();
    }
    assert_eq!(gate.outstanding_nonces(), 1024);
}
