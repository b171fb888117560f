use anyhow::{Context, Result, bail};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// Digest algorithms accepted for published artifact hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha256,
}

impl HashAlgorithm {
    /// Prefix used in the canonical `<algorithm>:<hex>` form.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }

    const fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }

    /// Splits an expected hash into its algorithm and lowercase hex digest.
    ///
    /// An explicit `md5:` or `sha256:` prefix wins; a bare digest is identified by
    /// its length (32 hex digits for MD5, 64 for SHA-256).
    pub fn detect(checksum: &str) -> Result<(Self, String)> {
        let trimmed = checksum.trim();
        let (algorithm, hex) = match trimmed.split_once(':') {
            Some((prefix, hex)) if prefix.eq_ignore_ascii_case("md5") => (Some(Self::Md5), hex),
            Some((prefix, hex)) if prefix.eq_ignore_ascii_case("sha256") => (Some(Self::Sha256), hex),
            Some((prefix, _)) => bail!("Unsupported checksum algorithm: {prefix}"),
            None => (None, trimmed),
        };

        let hex = hex.to_lowercase();
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("Checksum is not a hex digest: {checksum}");
        }

        let algorithm = match algorithm {
            Some(algorithm) => algorithm,
            None => match hex.len() {
                32 => Self::Md5,
                64 => Self::Sha256,
                n => bail!("Unsupported checksum length {n}: expected 32 (MD5) or 64 (SHA-256) hex digits"),
            },
        };

        if hex.len() != algorithm.hex_len() {
            bail!(
                "Malformed {} checksum: expected {} hex digits, got {}",
                algorithm.prefix(),
                algorithm.hex_len(),
                hex.len()
            );
        }
        Ok((algorithm, hex))
    }
}

/// Integrity checks for downloaded release artifacts.
///
/// The update server publishes a content hash and a byte size for every artifact.
/// `ChecksumVerifier` recomputes both from the file on disk before the artifact is
/// handed to the orchestrator; a mismatch means the download is discarded and nothing
/// on disk is modified.
///
/// # Hash Format
///
/// Expected hashes are MD5 or SHA-256, accepted either bare (`"dffd60..."`) or
/// prefixed (`"sha256:dffd60..."`, `"md5:65a8e2..."`), in any letter case. A bare
/// digest's algorithm is taken from its length. Computed hashes are always returned
/// in the prefixed lowercase form.
///
/// # Examples
///
/// ```rust,no_run
/// use updraft::upgrade::ChecksumVerifier;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let artifact = Path::new("/tmp/app-2.0.0.tar.gz");
/// ChecksumVerifier::verify_artifact(artifact, 1_048_576, "sha256:abc123...").await?;
/// # Ok(())
/// # }
/// ```
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    const BUFFER_SIZE: usize = 64 * 1024;

    /// Computes the SHA-256 of a file as `sha256:<lowercase hex>`.
    pub async fn compute_sha256(file_path: &Path) -> Result<String> {
        Self::compute(file_path, HashAlgorithm::Sha256).await
    }

    /// Computes the MD5 of a file as `md5:<lowercase hex>`.
    pub async fn compute_md5(file_path: &Path) -> Result<String> {
        Self::compute(file_path, HashAlgorithm::Md5).await
    }

    /// Computes a file digest as `<algorithm>:<lowercase hex>`.
    pub async fn compute(file_path: &Path, algorithm: HashAlgorithm) -> Result<String> {
        debug!("Computing {} checksum for: {:?}", algorithm.prefix(), file_path);
        let digest = match algorithm {
            HashAlgorithm::Md5 => Self::digest_file::<Md5>(file_path).await?,
            HashAlgorithm::Sha256 => Self::digest_file::<Sha256>(file_path).await?,
        };
        Ok(format!("{}:{digest}", algorithm.prefix()))
    }

    /// Streams the file through `D` in fixed-size chunks rather than loading it whole.
    async fn digest_file<D: Digest>(file_path: &Path) -> Result<String> {
        let mut file = fs::File::open(file_path)
            .await
            .with_context(|| format!("Failed to read file: {file_path:?}"))?;

        let mut hasher = D::new();
        let mut buffer = vec![0u8; Self::BUFFER_SIZE];
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .with_context(|| format!("Failed to read file: {file_path:?}"))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Verifies a file against an expected MD5 or SHA-256.
    pub async fn verify_checksum(file_path: &Path, expected_checksum: &str) -> Result<()> {
        info!("Verifying checksum for: {:?}", file_path);

        let (algorithm, expected_hex) = HashAlgorithm::detect(expected_checksum)?;
        let actual_checksum = Self::compute(file_path, algorithm).await?;

        if actual_checksum != format!("{}:{expected_hex}", algorithm.prefix()) {
            bail!(
                "Checksum verification failed!\n  Expected: {expected_checksum}\n  Actual:   {actual_checksum}"
            );
        }

        info!("Checksum verification successful");
        Ok(())
    }

    /// Verifies the byte size of a file.
    pub async fn verify_size(file_path: &Path, expected_size: u64) -> Result<()> {
        let actual = fs::metadata(file_path)
            .await
            .with_context(|| format!("Failed to read metadata: {file_path:?}"))?
            .len();

        if actual != expected_size {
            bail!("File size mismatch!\n  Expected: {expected_size} bytes\n  Actual:   {actual} bytes");
        }
        Ok(())
    }

    /// Verifies size and hash of a downloaded artifact.
    ///
    /// A size of 0 or an empty hash means the server did not publish that value; the
    /// corresponding check is skipped with a warning.
    pub async fn verify_artifact(
        file_path: &Path,
        expected_size: u64,
        expected_checksum: &str,
    ) -> Result<()> {
        if expected_size > 0 {
            Self::verify_size(file_path, expected_size).await?;
        }

        if expected_checksum.trim().is_empty() {
            warn!("No checksum published for {:?}, skipping hash verification", file_path);
            return Ok(());
        }

        Self::verify_checksum(file_path, expected_checksum).await
    }
}
