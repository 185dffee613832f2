//! OCI references and the artifact rules layered on `oci_spec` documents.
//!
//! Artifacts are single-file: one layer per manifest, one manifest per
//! platform in an index.

use oci_spec::image::{
    Arch, DescriptorBuilder, Digest, ImageIndexBuilder, ImageManifestBuilder, Os, PlatformBuilder,
};
use serde::Deserialize;
use sha2::Sha256;

use crate::domain::error::OciError;
use crate::domain::release::Platform;

pub use oci_spec::image::{ANNOTATION_TITLE, Descriptor, ImageIndex, ImageManifest, MediaType};

/// A parsed `oci://host/repo[:tag|@digest]` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    /// Registry authority, `host[:port]`.
    pub registry: String,
    /// Repository path without the leading slash.
    pub repository: String,
    /// Tag or digest; `latest` when absent.
    pub reference: String,
}

impl OciReference {
    /// # Errors
    ///
    /// Returns [`OciError::BadUrl`] for a non-`oci` scheme, a missing host or
    /// a missing repository path.
    pub fn parse(url: &str) -> Result<Self, OciError> {
        let bad = |reason: &str| OciError::BadUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(bad("missing scheme"));
        };
        if scheme != "oci" {
            return Err(bad(&format!("unsupported scheme {scheme}")));
        }
        let (registry, path) = match rest.split_once('/') {
            Some((host, path)) => (host, path),
            None => (rest, ""),
        };
        if registry.is_empty() {
            return Err(bad("host is required"));
        }
        if path.is_empty() {
            return Err(bad("path is required"));
        }

        let (repository, reference) = if let Some((repo, digest)) = path.split_once('@') {
            (repo, digest)
        } else if let Some((repo, tag)) = path.split_once(':') {
            (repo, tag)
        } else {
            (path, "latest")
        };
        if repository.is_empty() || reference.is_empty() {
            return Err(bad("repository and reference must not be empty"));
        }
        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            reference: reference.to_string(),
        })
    }

    /// Base URL of the registry API for this repository.
    #[must_use]
    pub fn api_base(&self, insecure: bool) -> String {
        let scheme = if insecure { "http" } else { "https" };
        format!("{scheme}://{}/v2/{}", self.registry, self.repository)
    }
}

const SCHEMA_VERSION: u32 = 2;

fn spec_error(err: impl std::fmt::Display) -> OciError {
    OciError::Spec(err.to_string())
}

/// Describe `data` with a computed sha256 digest.
///
/// # Errors
///
/// Returns [`OciError::Spec`] if the descriptor cannot be built.
pub fn descriptor_for(media_type: MediaType, data: &[u8]) -> Result<Descriptor, OciError> {
    let digest: Digest = sha256_digest(data).parse().map_err(spec_error)?;
    DescriptorBuilder::default()
        .media_type(media_type)
        .digest(digest)
        .size(data.len() as u64)
        .build()
        .map_err(spec_error)
}

/// Tag `descriptor` as built for `platform`.
///
/// # Errors
///
/// Returns [`OciError::Spec`] if the platform cannot be built.
pub fn set_platform(descriptor: &mut Descriptor, platform: &Platform) -> Result<(), OciError> {
    let platform = PlatformBuilder::default()
        .os(Os::from(platform.os.as_str()))
        .architecture(Arch::from(platform.arch.as_str()))
        .build()
        .map_err(spec_error)?;
    descriptor.set_platform(Some(platform));
    Ok(())
}

/// Whether `descriptor` was built for `platform`.
#[must_use]
pub fn matches_platform(descriptor: &Descriptor, platform: &Platform) -> bool {
    descriptor.platform().as_ref().is_some_and(|p| {
        p.os().to_string() == platform.os && p.architecture().to_string() == platform.arch
    })
}

/// The entry of `index` built for `platform`.
///
/// # Errors
///
/// Returns [`OciError::NoMatchingPlatform`] when no entry matches.
pub fn find_platform<'a>(index: &'a ImageIndex, platform: &Platform) -> Result<&'a Descriptor, OciError> {
    index
        .manifests()
        .iter()
        .find(|m| matches_platform(m, platform))
        .ok_or_else(|| OciError::NoMatchingPlatform {
            os: platform.os.clone(),
            arch: platform.arch.clone(),
        })
}

/// The single layer of an artifact manifest, which must carry `media_type`.
///
/// # Errors
///
/// Returns [`OciError::LayerCount`] unless there is exactly one layer,
/// and [`OciError::UnsupportedMediaType`] when its media type differs.
pub fn single_layer<'a>(manifest: &'a ImageManifest, media_type: &str) -> Result<&'a Descriptor, OciError> {
    let [layer] = manifest.layers().as_slice() else {
        return Err(OciError::LayerCount(manifest.layers().len()));
    };
    let actual = layer.media_type().to_string();
    if actual != media_type {
        return Err(OciError::UnsupportedMediaType(actual));
    }
    Ok(layer)
}

/// Build the single-layer manifest of a file artifact.
///
/// # Errors
///
/// Returns [`OciError::Spec`] if the manifest cannot be built.
pub fn artifact_manifest(
    layer: Descriptor,
    config: Descriptor,
    artifact_type: &str,
) -> Result<ImageManifest, OciError> {
    ImageManifestBuilder::default()
        .schema_version(SCHEMA_VERSION)
        .media_type(MediaType::ImageManifest)
        .artifact_type(MediaType::from(artifact_type))
        .config(config)
        .layers(vec![layer])
        .build()
        .map_err(spec_error)
}

/// Build the index referencing one manifest per platform.
///
/// # Errors
///
/// Returns [`OciError::Spec`] if the index cannot be built.
pub fn platform_index(manifests: Vec<Descriptor>) -> Result<ImageIndex, OciError> {
    ImageIndexBuilder::default()
        .schema_version(SCHEMA_VERSION)
        .media_type(MediaType::ImageIndex)
        .manifests(manifests)
        .build()
        .map_err(spec_error)
}

/// Media type of a fetched manifest document.
///
/// The document's own `mediaType` wins; the registry's `Content-Type` is
/// used when the document does not carry one.
#[must_use]
pub fn detect_media_type(content_type: &str, body: &[u8]) -> MediaType {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Typed {
        #[serde(default)]
        media_type: String,
    }
    match serde_json::from_slice::<Typed>(body) {
        Ok(doc) if !doc.media_type.is_empty() => MediaType::from(doc.media_type.as_str()),
        _ => MediaType::from(content_type.split(';').next().unwrap_or_default().trim()),
    }
}

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: String,
    pub scope: String,
}

/// Parse a bearer challenge. Other schemes give `None`.
#[must_use]
pub fn parse_bearer_challenge(header: &str) -> Option<BearerChallenge> {
    let (scheme, params) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let mut challenge = BearerChallenge::default();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after) = rest.split_once('=')?;
        let (value, tail) = if let Some(quoted) = after.strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            after.split_once(',').unwrap_or((after, ""))
        };
        match key.trim() {
            "realm" => challenge.realm = value.to_string(),
            "service" => challenge.service = value.to_string(),
            "scope" => challenge.scope = value.to_string(),
            _ => {}
        }
        rest = tail.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    }
    (!challenge.realm.is_empty()).then_some(challenge)
}

/// `sha256:<hex>` of `data`.
#[must_use]
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(<Sha256 as sha2::Digest>::digest(data)))
}

/// Check `data` against a `sha256:` digest.
///
/// # Errors
///
/// Returns [`OciError::DigestMismatch`] when the digests differ and
/// [`OciError::UnsupportedMediaType`] for a non-sha256 algorithm.
pub fn verify_digest(expected: &str, data: &[u8]) -> Result<(), OciError> {
    if !expected.starts_with("sha256:") {
        return Err(OciError::UnsupportedMediaType(format!(
            "digest algorithm of {expected}"
        )));
    }
    let actual = sha256_digest(data);
    if actual != expected {
        return Err(OciError::DigestMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
