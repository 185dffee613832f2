// @generated
// Generated from: proto/pipedservice.proto
// Manual check-in for offline builds.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetDesiredVersionRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetDesiredVersionResponse {
    #[prost(string, tag = "1")]
    pub version: ::prost::alloc::string::String,
}

pub mod piped_service_client {
    #![allow(clippy::derive_partial_eq_without_eq)]
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct PipedServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl<T> PipedServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + Send + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
        <T::ResponseBody as Body>::Data: Into<Bytes> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        pub async fn get_desired_version(
            &mut self,
            request: impl tonic::IntoRequest<super::GetDesiredVersionRequest>,
        ) -> Result<tonic::Response<super::GetDesiredVersionResponse>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = tonic::codegen::http::uri::PathAndQuery::from_static(
                "/grpc.service.pipedservice.PipedService/GetDesiredVersion",
            );
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
}
