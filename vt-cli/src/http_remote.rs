//! `HttpRemoteApi`: the real `RemoteApi` implementation, talking to a Val
//! Town-shaped REST API over `reqwest`. This is the one collaborator
//! `vt-core` never implements itself (`spec.md` §1); everything here is CLI
//! glue, not engine logic.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use vt_core::remote_api::{
    BranchId, BranchInfo, FileEntry, FileWrite, Kind, RemoteApi, RemoteError, RemoteResult,
    UserIdentity, ValId, ValInfo, ValPrivacy,
};

pub struct HttpRemoteApi {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpRemoteApi {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        HttpRemoteApi {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> RemoteResult<reqwest::Response> {
        let response = builder
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(response.url().path().to_string())),
            StatusCode::CONFLICT => Err(RemoteError::Conflict(
                response.text().await.unwrap_or_default(),
            )),
            StatusCode::UNAUTHORIZED => Err(RemoteError::Unauthenticated),
            StatusCode::FORBIDDEN => Err(RemoteError::PermissionDenied(
                response.text().await.unwrap_or_default(),
            )),
            status => Err(RemoteError::Unavailable(format!(
                "unexpected status {status}"
            ))),
        }
    }
}

#[derive(Deserialize)]
struct ValResponse {
    id: ValId,
    author: AuthorResponse,
    privacy: String,
    #[serde(default)]
    can_write: bool,
}

#[derive(Deserialize)]
struct AuthorResponse {
    id: String,
}

#[derive(Deserialize)]
struct BranchResponse {
    id: BranchId,
    name: String,
    version: u64,
    #[serde(rename = "createdAt")]
    created_at: i64,
    #[serde(rename = "updatedAt")]
    updated_at: i64,
}

#[derive(Deserialize)]
struct FileResponse {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "updatedAt")]
    updated_at: i64,
}

#[derive(Serialize)]
struct CreateBranchBody<'a> {
    name: &'a str,
    #[serde(rename = "branchId")]
    forked_from_id: BranchId,
}

#[derive(Serialize)]
struct WriteFileBody<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(rename = "branchId")]
    branch_id: BranchId,
    content: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateValBody<'a> {
    name: &'a str,
    privacy: &'a str,
    description: Option<&'a str>,
    #[serde(rename = "orgId", skip_serializing_if = "Option::is_none")]
    org_id: Option<&'a str>,
}

fn kind_to_wire(kind: Kind) -> &'static str {
    match kind {
        Kind::Directory => "directory",
        Kind::File => "file",
        Kind::Script => "script",
        Kind::Http => "http",
        Kind::Email => "email",
        Kind::Interval => "interval",
    }
}

fn kind_from_wire(kind: &str) -> Kind {
    match kind {
        "directory" => Kind::Directory,
        "script" => Kind::Script,
        "http" => Kind::Http,
        "email" => Kind::Email,
        "interval" => Kind::Interval,
        _ => Kind::File,
    }
}

fn privacy_to_wire(privacy: ValPrivacy) -> &'static str {
    match privacy {
        ValPrivacy::Public => "public",
        ValPrivacy::Private => "private",
        ValPrivacy::Unlisted => "unlisted",
    }
}

fn privacy_from_wire(privacy: &str) -> ValPrivacy {
    match privacy {
        "private" => ValPrivacy::Private,
        "unlisted" => ValPrivacy::Unlisted,
        _ => ValPrivacy::Public,
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn retrieve_val(&self, val_id: ValId) -> RemoteResult<ValInfo> {
        let resp = self
            .send(self.client.get(self.url(&format!("/v1/vals/{val_id}"))))
            .await?;
        let body: ValResponse = resp
            .json()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;
        Ok(ValInfo {
            id: body.id,
            author_id: body.author.id,
            privacy: privacy_from_wire(&body.privacy),
            can_write: body.can_write,
        })
    }

    async fn list_branches(&self, val_id: ValId) -> RemoteResult<Vec<BranchInfo>> {
        let resp = self
            .send(self.client.get(self.url(&format!("/v1/vals/{val_id}/branches"))))
            .await?;
        let body: Vec<BranchResponse> = resp
            .json()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;
        Ok(body
            .into_iter()
            .map(|b| BranchInfo {
                id: b.id,
                name: b.name,
                version: b.version,
                created_at_ms: b.created_at,
                updated_at_ms: b.updated_at,
            })
            .collect())
    }

    async fn retrieve_branch(&self, val_id: ValId, branch_id: BranchId) -> RemoteResult<BranchInfo> {
        let resp = self
            .send(
                self.client
                    .get(self.url(&format!("/v1/vals/{val_id}/branches/{branch_id}"))),
            )
            .await?;
        let body: BranchResponse = resp
            .json()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;
        Ok(BranchInfo {
            id: body.id,
            name: body.name,
            version: body.version,
            created_at_ms: body.created_at,
            updated_at_ms: body.updated_at,
        })
    }

    async fn create_branch(
        &self,
        val_id: ValId,
        name: &str,
        forked_from_id: BranchId,
    ) -> RemoteResult<BranchInfo> {
        let resp = self
            .send(
                self.client
                    .post(self.url(&format!("/v1/vals/{val_id}/branches")))
                    .json(&CreateBranchBody { name, forked_from_id }),
            )
            .await?;
        let body: BranchResponse = resp
            .json()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;
        Ok(BranchInfo {
            id: body.id,
            name: body.name,
            version: body.version,
            created_at_ms: body.created_at,
            updated_at_ms: body.updated_at,
        })
    }

    async fn delete_branch(&self, val_id: ValId, branch_id: BranchId) -> RemoteResult<()> {
        self.send(
            self.client
                .delete(self.url(&format!("/v1/vals/{val_id}/branches/{branch_id}"))),
        )
        .await?;
        Ok(())
    }

    async fn list_files(
        &self,
        val_id: ValId,
        branch_id: BranchId,
        version: u64,
        recursive: bool,
    ) -> RemoteResult<Vec<FileEntry>> {
        let resp = self
            .send(self.client.get(self.url(&format!(
                "/v1/vals/{val_id}/files?branch_id={branch_id}&version={version}&recursive={recursive}"
            ))))
            .await?;
        let body: Vec<FileResponse> = resp
            .json()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;
        Ok(body
            .into_iter()
            .map(|f| FileEntry {
                path: f.path,
                kind: kind_from_wire(&f.kind),
                mtime_ms: f.updated_at,
                content: None,
            })
            .collect())
    }

    async fn get_content(
        &self,
        val_id: ValId,
        path: &str,
        branch_id: BranchId,
        version: u64,
    ) -> RemoteResult<Vec<u8>> {
        let resp = self
            .send(self.client.get(self.url(&format!(
                "/v1/vals/{val_id}/files/{path}/content?branch_id={branch_id}&version={version}"
            ))))
            .await?;
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|err| RemoteError::Unavailable(err.to_string()))
    }

    async fn create_file(
        &self,
        val_id: ValId,
        path: &str,
        branch_id: BranchId,
        write: FileWrite<'_>,
    ) -> RemoteResult<()> {
        let content = write.content.map(|bytes| String::from_utf8_lossy(bytes).into_owned());
        self.send(
            self.client
                .post(self.url(&format!("/v1/vals/{val_id}/files/{path}")))
                .json(&WriteFileBody {
                    name: write.name,
                    kind: kind_to_wire(write.kind),
                    branch_id,
                    content: content.as_deref(),
                }),
        )
        .await?;
        Ok(())
    }

    async fn update_file(
        &self,
        val_id: ValId,
        path: &str,
        branch_id: BranchId,
        write: FileWrite<'_>,
    ) -> RemoteResult<()> {
        let content = write.content.map(|bytes| String::from_utf8_lossy(bytes).into_owned());
        self.send(
            self.client
                .put(self.url(&format!("/v1/vals/{val_id}/files/{path}")))
                .json(&WriteFileBody {
                    name: write.name,
                    kind: kind_to_wire(write.kind),
                    branch_id,
                    content: content.as_deref(),
                }),
        )
        .await?;
        Ok(())
    }

    async fn delete_file(
        &self,
        val_id: ValId,
        path: &str,
        branch_id: BranchId,
        version: u64,
    ) -> RemoteResult<()> {
        self.send(self.client.delete(self.url(&format!(
            "/v1/vals/{val_id}/files/{path}?branch_id={branch_id}&version={version}"
        ))))
        .await?;
        Ok(())
    }

    async fn create_val(
        &self,
        name: &str,
        privacy: ValPrivacy,
        description: Option<&str>,
        org_id: Option<&str>,
    ) -> RemoteResult<ValInfo> {
        let resp = self
            .send(self.client.post(self.url("/v1/vals")).json(&CreateValBody {
                name,
                privacy: privacy_to_wire(privacy),
                description,
                org_id,
            }))
            .await?;
        let body: ValResponse = resp
            .json()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;
        Ok(ValInfo {
            id: body.id,
            author_id: body.author.id,
            privacy: privacy_from_wire(&body.privacy),
            can_write: body.can_write,
        })
    }

    async fn delete_val(&self, val_id: ValId) -> RemoteResult<()> {
        self.send(self.client.delete(self.url(&format!("/v1/vals/{val_id}"))))
            .await?;
        Ok(())
    }

    async fn current_user(&self) -> RemoteResult<UserIdentity> {
        let resp = self.send(self.client.get(self.url("/v1/me"))).await?;
        resp.json()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))
    }
}
