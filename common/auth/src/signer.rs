use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{crypto, Algorithm, DecodingKey, EncodingKey};
use serde_json::{Map, Value};

use crate::claims::{Audience, Claims};
use crate::config::EngineConfig;
use crate::error::{AuthError, AuthResult};

/// JOSE header of a token.
pub type Headers = Map<String, Value>;

/// Header names the signer owns; callers cannot override them.
const RESERVED_HEADERS: [&str; 2] = ["alg", "typ"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

impl KeyFamily {
    fn of(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => KeyFamily::Hmac,
            Algorithm::ES256 | Algorithm::ES384 => KeyFamily::Ec,
            Algorithm::EdDSA => KeyFamily::Ed,
            _ => KeyFamily::Rsa,
        }
    }
}

/// Standard claim expectations checked once the signature is known to be good.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimChecks<'a> {
    pub issuer: Option<&'a str>,
    pub audience: Option<&'a Audience>,
    pub leeway: u64,
}

/// Signs and verifies compact tokens with the configured key material.
pub struct TokenSigner {
    algorithm: Algorithm,
    allowed: Vec<Algorithm>,
    secret: Option<(EncodingKey, DecodingKey)>,
    private: Option<(KeyFamily, EncodingKey)>,
    public: Option<(KeyFamily, DecodingKey)>,
}

impl TokenSigner {
    /// Derive keys from the configuration. Missing keys are only reported when
    /// an operation needs them; malformed PEM fails here.
    pub fn from_config(config: &EngineConfig) -> AuthResult<Self> {
        let allowed = config.allowed_algorithms();
        let asymmetric = std::iter::once(config.algorithm)
            .chain(allowed.iter().copied())
            .map(KeyFamily::of)
            .find(|family| *family != KeyFamily::Hmac);

        let secret = config.secret_key.as_ref().map(|secret| {
            (
                EncodingKey::from_secret(secret.as_bytes()),
                DecodingKey::from_secret(secret.as_bytes()),
            )
        });

        let (private, public) = match asymmetric {
            Some(family) => (
                config
                    .private_key
                    .as_deref()
                    .map(|pem| encoding_key_from_pem(family, pem).map(|key| (family, key)))
                    .transpose()?,
                config
                    .public_key
                    .as_deref()
                    .map(|pem| decoding_key_from_pem(family, pem).map(|key| (family, key)))
                    .transpose()?,
            ),
            None => (None, None),
        };

        Ok(Self {
            algorithm: config.algorithm,
            allowed,
            secret,
            private,
            public,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn allowed_algorithms(&self) -> &[Algorithm] {
        &self.allowed
    }

    /// Serialize and sign `claims`, merging any custom header fields.
    pub fn sign(&self, claims: &Claims, headers: Option<&Headers>) -> AuthResult<String> {
        let key = self.encoding_key(self.algorithm)?;

        let mut header = Headers::new();
        if let Some(custom) = headers {
            for (name, value) in custom {
                if !RESERVED_HEADERS.contains(&name.as_str()) {
                    header.insert(name.clone(), value.clone());
                }
            }
        }
        header.insert("typ".into(), Value::String("JWT".into()));
        header.insert(
            "alg".into(),
            Value::String(algorithm_name(self.algorithm)),
        );

        let header = serde_json::to_vec(&header)
            .map_err(|err| AuthError::invalid_input(format!("unserializable header: {err}")))?;
        let payload = serde_json::to_vec(claims)
            .map_err(|err| AuthError::invalid_input(format!("unserializable claims: {err}")))?;

        let message = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let signature = crypto::sign(message.as_bytes(), key, self.algorithm)?;
        Ok(format!("{message}.{signature}"))
    }

    /// Full verification: structure, algorithm allow-list, signature, payload
    /// shape and the standard time/issuer/audience claims.
    pub fn verify(&self, token: &str, checks: &ClaimChecks<'_>) -> AuthResult<Claims> {
        self.verify_at(token, checks, Utc::now().timestamp())
    }

    fn verify_at(&self, token: &str, checks: &ClaimChecks<'_>, now: i64) -> AuthResult<Claims> {
        if self.secret.is_none() && self.public.is_none() {
            return Err(missing_key(self.algorithm));
        }

        let [header_segment, payload_segment, signature] = split_segments(token)?;
        let header = decode_header_segment(header_segment)?;
        let algorithm = header_algorithm(&header)?;
        if !self.allowed.contains(&algorithm) {
            return Err(AuthError::verification(
                "The specified alg value is not allowed",
            ));
        }

        let key = self.decoding_key(algorithm).map_err(|err| {
            if KeyFamily::of(algorithm) == KeyFamily::of(self.algorithm) {
                err
            } else {
                AuthError::verification("The specified alg value is not allowed")
            }
        })?;
        let message = &token[..header_segment.len() + 1 + payload_segment.len()];
        let signature_failed = || AuthError::verification("Signature verification failed");
        match crypto::verify(signature, message.as_bytes(), key, algorithm) {
            Ok(true) => {}
            Ok(false) => return Err(signature_failed()),
            Err(err) => {
                return Err(match AuthError::from(err) {
                    AuthError::Config(message) => AuthError::Config(message),
                    _ => signature_failed(),
                })
            }
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_segment)
            .map_err(|_| AuthError::verification("Invalid payload padding"))?;
        let claims = Claims::parse(&payload)?;
        validate_registered_claims(&claims, checks, now)?;
        Ok(claims)
    }

    /// Decode the header segment only. Nothing about the token is trusted.
    pub fn unverified_header(&self, token: &str) -> AuthResult<Headers> {
        let [header_segment, _, _] = split_segments(token)?;
        decode_header_segment(header_segment)
    }

    fn encoding_key(&self, algorithm: Algorithm) -> AuthResult<&EncodingKey> {
        match KeyFamily::of(algorithm) {
            KeyFamily::Hmac => self.secret.as_ref().map(|(key, _)| key),
            family => self
                .private
                .as_ref()
                .filter(|(key_family, _)| *key_family == family)
                .map(|(_, key)| key),
        }
        .ok_or_else(|| missing_key(algorithm))
    }

    fn decoding_key(&self, algorithm: Algorithm) -> AuthResult<&DecodingKey> {
        match KeyFamily::of(algorithm) {
            KeyFamily::Hmac => self.secret.as_ref().map(|(_, key)| key),
            family => self
                .public
                .as_ref()
                .filter(|(key_family, _)| *key_family == family)
                .map(|(_, key)| key),
        }
        .ok_or_else(|| missing_key(algorithm))
    }
}

fn algorithm_name(algorithm: Algorithm) -> String {
    format!("{algorithm:?}")
}

fn missing_key(algorithm: Algorithm) -> AuthError {
    let name = algorithm_name(algorithm);
    match KeyFamily::of(algorithm) {
        KeyFamily::Hmac => AuthError::config(format!(
            "AUTHJWT_SECRET_KEY must be set when using symmetric algorithm {name}"
        )),
        _ => AuthError::config(format!(
            "AUTHJWT_PRIVATE_KEY and AUTHJWT_PUBLIC_KEY must be set when using asymmetric algorithm {name}"
        )),
    }
}

fn encoding_key_from_pem(family: KeyFamily, pem: &str) -> AuthResult<EncodingKey> {
    let pem = pem.as_bytes();
    match family {
        KeyFamily::Rsa => EncodingKey::from_rsa_pem(pem),
        KeyFamily::Ec => EncodingKey::from_ec_pem(pem),
        KeyFamily::Ed => EncodingKey::from_ed_pem(pem),
        KeyFamily::Hmac => Ok(EncodingKey::from_secret(pem)),
    }
    .map_err(|err| AuthError::config(format!("Failed to parse AUTHJWT_PRIVATE_KEY: {err}")))
}

fn decoding_key_from_pem(family: KeyFamily, pem: &str) -> AuthResult<DecodingKey> {
    let pem = pem.as_bytes();
    match family {
        KeyFamily::Rsa => DecodingKey::from_rsa_pem(pem),
        KeyFamily::Ec => DecodingKey::from_ec_pem(pem),
        KeyFamily::Ed => DecodingKey::from_ed_pem(pem),
        KeyFamily::Hmac => Ok(DecodingKey::from_secret(pem)),
    }
    .map_err(|err| AuthError::config(format!("Failed to parse AUTHJWT_PUBLIC_KEY: {err}")))
}

fn split_segments(token: &str) -> AuthResult<[&str; 3]> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok([header, payload, signature]),
        (_, _, _, Some(_)) => Err(AuthError::verification("Too many segments")),
        _ => Err(AuthError::verification("Not enough segments")),
    }
}

fn decode_header_segment(segment: &str) -> AuthResult<Headers> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::verification("Invalid header padding"))?;
    serde_json::from_slice(&raw).map_err(|_| AuthError::verification("Invalid header string"))
}

fn header_algorithm(header: &Headers) -> AuthResult<Algorithm> {
    header
        .get("alg")
        .and_then(Value::as_str)
        .and_then(|name| name.parse::<Algorithm>().ok())
        .ok_or_else(|| AuthError::verification("Algorithm not supported"))
}

fn validate_registered_claims(claims: &Claims, checks: &ClaimChecks<'_>, now: i64) -> AuthResult<()> {
    let leeway = i64::try_from(checks.leeway).unwrap_or(i64::MAX);

    if now < claims.nbf.saturating_sub(leeway) {
        return Err(AuthError::verification("The token is not yet valid (nbf)"));
    }

    if let Some(exp) = claims.exp {
        if now > exp.saturating_add(leeway) {
            return Err(AuthError::verification("Signature has expired"));
        }
    }

    match (checks.issuer, claims.iss.as_deref()) {
        (Some(_), None) => {
            return Err(AuthError::verification(
                "Token is missing the \"iss\" claim",
            ))
        }
        (Some(expected), Some(actual)) if expected != actual => {
            return Err(AuthError::verification("Invalid issuer"))
        }
        _ => {}
    }

    match (checks.audience, &claims.aud) {
        (None, None) => {}
        (None, Some(_)) => return Err(AuthError::verification("Invalid audience")),
        (Some(_), None) => {
            return Err(AuthError::verification(
                "Token is missing the \"aud\" claim",
            ))
        }
        (Some(expected), Some(actual)) => {
            let expected = expected.values();
            if !actual.values().iter().any(|item| expected.contains(item)) {
                return Err(AuthError::verification("Invalid audience"));
            }
        }
    }
    Ok(())
}
