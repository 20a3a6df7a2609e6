//! WebDAV operations against the code-version tree.

use std::path::Path;

use cartsync_transport::{RequestSpec, Transport};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::{info, warn};

use crate::path::to_remote_path;
use crate::DavError;

/// Remote WebDAV root for code versions.
const CODE_BASE: &str = "/webdav/cartridges";

/// Characters escaped in remote URI paths; `/` stays a separator.
const URI_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Client for the remote cartridge tree of one code version.
///
/// Credentials and base URL are bound once at construction via the
/// transport. Every operation is a single logical transfer; tree-level
/// composition (walking directories, ordering) is the caller's concern.
pub struct DavClient {
    transport: Transport,
    code_version: String,
}

impl DavClient {
    /// Creates a client over an authenticated transport.
    pub fn new(transport: Transport, code_version: impl Into<String>) -> Self {
        Self {
            transport,
            code_version: code_version.into(),
        }
    }

    /// Remote URI for a translated cartridge path.
    fn code_url(&self, remote_rel: &str) -> String {
        let escaped = utf8_percent_encode(remote_rel, URI_PATH);
        format!("{}/{}/{}", CODE_BASE, self.code_version, escaped)
    }

    /// Translates `local`, failing when it carries no cartridge marker.
    fn translate(&self, local: &Path) -> Result<String, DavError> {
        to_remote_path(local)
            .map(|rel| self.code_url(&rel))
            .ok_or_else(|| DavError::OutsideCartridge(local.to_path_buf()))
    }

    /// Uploads a local file into the remote tree.
    pub async fn put(&self, local: &Path) -> Result<(), DavError> {
        let target = self.translate(local)?;
        self.transport
            .send(&RequestSpec::put_file(&target, local.to_path_buf()))
            .await?;
        info!(target = %target, "uploaded");
        Ok(())
    }

    /// Creates a collection (directory) in the remote tree.
    pub async fn mkcol(&self, local: &Path) -> Result<(), DavError> {
        let target = self.translate(local)?;
        self.transport.send(&RequestSpec::mkcol(&target)).await?;
        info!(target = %target, "collection created");
        Ok(())
    }

    /// Deletes a file or collection from the remote tree.
    ///
    /// Collection deletes recurse server-side; a 404 counts as success.
    pub async fn delete(&self, local: &Path) -> Result<(), DavError> {
        let target = self.translate(local)?;
        self.transport.send(&RequestSpec::delete(&target)).await?;
        info!(target = %target, "deleted");
        Ok(())
    }

    /// Uploads an archive under the code-version root by name.
    pub async fn put_archive(&self, name: &str, local: &Path) -> Result<(), DavError> {
        let target = self.code_url(name);
        self.transport
            .send(&RequestSpec::put_file(&target, local.to_path_buf()))
            .await?;
        info!(target = %target, "archive uploaded");
        Ok(())
    }

    /// Triggers a server-side unzip of an uploaded archive, in place.
    pub async fn unzip(&self, name: &str) -> Result<(), DavError> {
        let target = self.code_url(name);
        self.transport
            .send(&RequestSpec::post_form(
                &target,
                vec![("method".into(), "UNZIP".into())],
            ))
            .await?;
        info!(target = %target, "unzipped remotely");
        Ok(())
    }

    /// Deletes a remote resource under the code-version root by name.
    pub async fn delete_remote(&self, name: &str) -> Result<(), DavError> {
        let target = self.code_url(name);
        self.transport.send(&RequestSpec::delete(&target)).await?;
        info!(target = %target, "remote resource deleted");
        Ok(())
    }

    /// Lists the code-version root, returning the raw multi-status body.
    ///
    /// Parsing the XML is the caller's concern.
    pub async fn propfind(&self) -> Result<String, DavError> {
        let target = self.code_url("");
        let body = self.transport.send(&RequestSpec::propfind(&target)).await?;
        Ok(body)
    }

    /// Deploys a local zip archive: upload, unzip in place, remove the
    /// remote archive.
    ///
    /// The remote archive is a temporary artifact, so removal is attempted
    /// even when the unzip step fails; the first error still wins.
    pub async fn deploy_archive(&self, local_zip: &Path) -> Result<(), DavError> {
        let name = local_zip
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DavError::BadArchiveName(local_zip.to_path_buf()))?;

        self.put_archive(name, local_zip).await?;

        let unzip_result = self.unzip(name).await;

        if let Err(e) = self.delete_remote(name).await {
            warn!(archive = name, error = %e, "failed to remove remote archive");
            // Cleanup failure only surfaces when the unzip itself worked.
            unzip_result?;
            return Err(e);
        }

        unzip_result
    }
}
