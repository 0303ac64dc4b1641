//! Wire messages of the `parca.debuginfo.v1alpha1.DebuginfoService` gRPC service.

/// Fully-qualified name of the store's gRPC service.
pub const SERVICE: &str = "parca.debuginfo.v1alpha1.DebuginfoService";

pub const SHOULD_INITIATE_UPLOAD_PATH: &str =
    "/parca.debuginfo.v1alpha1.DebuginfoService/ShouldInitiateUpload";
pub const INITIATE_UPLOAD_PATH: &str = "/parca.debuginfo.v1alpha1.DebuginfoService/InitiateUpload";
pub const MARK_UPLOAD_FINISHED_PATH: &str =
    "/parca.debuginfo.v1alpha1.DebuginfoService/MarkUploadFinished";
pub const UPLOAD_PATH: &str = "/parca.debuginfo.v1alpha1.DebuginfoService/Upload";

/// Wire values of `UploadInstructions.upload_strategy`.
pub mod upload_strategy {
    pub const UNSPECIFIED: i32 = 0;
    pub const GRPC: i32 = 1;
    pub const SIGNED_URL: i32 = 2;
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ShouldInitiateUploadRequest {
    #[prost(string, tag = "1")]
    pub build_id: String,
    #[prost(string, tag = "2")]
    pub hash: String,
    #[prost(bool, tag = "3")]
    pub force: bool,
    #[prost(int32, tag = "4")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ShouldInitiateUploadResponse {
    #[prost(bool, tag = "1")]
    pub should_initiate_upload: bool,
    #[prost(string, tag = "2")]
    pub reason: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InitiateUploadRequest {
    #[prost(string, tag = "1")]
    pub build_id: String,
    #[prost(int64, tag = "2")]
    pub size: i64,
    #[prost(string, tag = "3")]
    pub hash: String,
    #[prost(bool, tag = "4")]
    pub force: bool,
    #[prost(int32, tag = "5")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InitiateUploadResponse {
    #[prost(message, optional, tag = "1")]
    pub upload_instructions: Option<UploadInstructions>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UploadInstructions {
    #[prost(string, tag = "1")]
    pub build_id: String,
    #[prost(string, tag = "2")]
    pub upload_id: String,
    #[prost(int32, tag = "3")]
    pub upload_strategy: i32,
    #[prost(string, tag = "4")]
    pub signed_url: String,
    #[prost(int32, tag = "5")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MarkUploadFinishedRequest {
    #[prost(string, tag = "1")]
    pub build_id: String,
    #[prost(string, tag = "2")]
    pub upload_id: String,
    #[prost(int32, tag = "3")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MarkUploadFinishedResponse {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UploadRequest {
    #[prost(oneof = "upload_request::Data", tags = "1, 2")]
    pub data: Option<upload_request::Data>,
}

pub mod upload_request {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "1")]
        Info(super::UploadInfo),
        #[prost(bytes, tag = "2")]
        ChunkData(Vec<u8>),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UploadInfo {
    #[prost(string, tag = "1")]
    pub build_id: String,
    #[prost(string, tag = "2")]
    pub upload_id: String,
    #[prost(int32, tag = "3")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UploadResponse {
    #[prost(string, tag = "1")]
    pub build_id: String,
    #[prost(uint64, tag = "2")]
    pub size: u64,
}
