//! Assembly of the GitHub App JWT assertion.
//!
//! The JWT is assembled locally (header and claims are plain JSON) and the
//! RS256 signature is produced by the remote [`AppSigner`]. GitHub caps the
//! assertion lifetime at ten minutes; the claims below use nine minutes with
//! a sixty second issued-at backdate to absorb clock skew.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;

use super::signer::AppSigner;
use super::{GitHubError, SignerError};

/// Backdate applied to `iat` to tolerate clock skew against GitHub.
const ISSUED_AT_SKEW_SECS: i64 = 60;

/// Assertion lifetime. GitHub rejects anything above ten minutes.
const EXPIRY_SECS: i64 = 9 * 60;

#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

#[derive(Serialize)]
struct Claims<'a> {
    iat: i64,
    exp: i64,
    iss: &'a str,
}

/// Builds a signed App JWT assertion for `app_id` at `now_epoch_secs`.
pub async fn app_assertion(
    app_id: &str,
    now_epoch_secs: i64,
    signer: &dyn AppSigner,
) -> Result<String, GitHubError> {
    let signing_input = signing_input(app_id, now_epoch_secs)
        .map_err(|err| GitHubError::InvalidResponse(format!("failed to encode jwt: {err}")))?;

    let signature = signer.sign_rs256(signing_input.as_bytes()).await?;
    if signature.is_empty() {
        return Err(GitHubError::Signer(SignerError::InvalidResponse(
            "empty signature".to_string(),
        )));
    }

    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

fn signing_input(app_id: &str, now_epoch_secs: i64) -> Result<String, serde_json::Error> {
    let header = serde_json::to_vec(&Header {
        alg: "RS256",
        typ: "JWT",
    })?;
    let claims = serde_json::to_vec(&Claims {
        iat: now_epoch_secs - ISSUED_AT_SKEW_SECS,
        exp: now_epoch_secs + EXPIRY_SECS,
        iss: app_id,
    })?;

    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(claims)
    ))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct FixedSigner;

    #[async_trait]
    impl AppSigner for FixedSigner {
        async fn sign_rs256(&self, _signing_input: &[u8]) -> Result<Vec<u8>, SignerError> {
            Ok(vec![0xAB; 16])
        }
    }

    struct EmptySigner;

    #[async_trait]
    impl AppSigner for EmptySigner {
        async fn sign_rs256(&self, _signing_input: &[u8]) -> Result<Vec<u8>, SignerError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn assertion_has_three_segments_and_expected_claims() {
        let token = app_assertion("12345", 1_700_000_000, &FixedSigner).await.unwrap();
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);

        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["typ"], "JWT");

        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments[1]).unwrap()).unwrap();
        assert_eq!(claims["iss"], "12345");
        assert_eq!(claims["iat"], 1_700_000_000i64 - 60);
        assert_eq!(claims["exp"], 1_700_000_000i64 + 540);

        assert_eq!(
            URL_SAFE_NO_PAD.decode(segments[2]).unwrap(),
            vec![0xAB; 16]
        );
    }

    #[tokio::test]
    async fn empty_signature_is_rejected() {
        let err = app_assertion("12345", 1_700_000_000, &EmptySigner)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GitHubError::Signer(SignerError::InvalidResponse(_))
        ));
    }
}
