//! Resource requests
//!
//! A [`Request`] holds one engine reference to a pending resource load. It is
//! `Send`, so a load answered with [`LoadResult::Delayed`](crate::notify::LoadResult)
//! can be completed from a worker thread.

use std::sync::Arc;

use crate::api::{self, RequestApi};
use crate::error::{RequestResult, Result};
use crate::types::RequestHandle;

/// HTTP verb of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Get,
    Post,
    Put,
    Delete,
}

impl RequestType {
    pub fn from_raw(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Get),
            2 => Some(Self::Post),
            3 => Some(Self::Put),
            4 => Some(Self::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Pending,
    Success,
    Failure,
}

impl RequestState {
    pub fn from_raw(code: u32) -> Self {
        match code {
            1 => Self::Success,
            2 => Self::Failure,
            _ => Self::Pending,
        }
    }
}

pub struct Request {
    rq: RequestHandle,
    api: Arc<dyn RequestApi>,
}

impl Request {
    /// Take a reference to `rq` through the current thread's engine
    pub fn new(rq: RequestHandle) -> Result<Self> {
        let api = api::api()?.request_api();
        Self::wrap(rq, api)
    }

    /// Take a reference to `rq` through `api`
    pub fn wrap(rq: RequestHandle, api: Arc<dyn RequestApi>) -> Result<Self> {
        api.use_request(rq).check("RequestUse")?;
        Ok(Self { rq, api })
    }

    pub fn handle(&self) -> RequestHandle {
        self.rq
    }

    /// Complete the request with `data`
    pub fn succeeded(&self, status: u32, data: &[u8]) -> Result<()> {
        tracing::debug!("Request {:?} succeeded ({}, {} bytes)", self.rq, status, data.len());
        self.api.set_succeeded(self.rq, status, data).check("RequestSetSucceeded")
    }

    pub fn failed(&self, status: u32, data: &[u8]) -> Result<()> {
        tracing::debug!("Request {:?} failed ({})", self.rq, status);
        self.api.set_failed(self.rq, status, data).check("RequestSetFailed")
    }

    /// Stream part of the response body
    pub fn append_data_chunk(&self, data: &[u8]) -> Result<()> {
        self.api.append_data_chunk(self.rq, data).check("RequestAppendDataChunk")
    }

    pub fn url(&self) -> Result<String> {
        let mut url = String::new();
        self.api
            .url(self.rq, &mut |s| url.push_str(s))
            .check("RequestUrl")?;
        Ok(url)
    }

    /// `None` for verbs this binding does not model
    pub fn request_type(&self) -> Result<Option<RequestType>> {
        let mut code = 0;
        self.api.request_type(self.rq, &mut code).check("RequestRequestType")?;
        Ok(RequestType::from_raw(code))
    }

    pub fn state(&self) -> Result<RequestState> {
        let mut code = 0;
        self.api.state(self.rq, &mut code).check("RequestGetRequestState")?;
        Ok(RequestState::from_raw(code))
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        let result = self.api.unuse_request(self.rq);
        if result != RequestResult::Ok {
            tracing::debug!("RequestUnUse({:?}) failed: {}", self.rq, result);
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request").field("rq", &self.rq).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingRequests;

    fn requests() -> Arc<RecordingRequests> {
        let api = Arc::new(RecordingRequests::new());
        api.add("this://app/data.json", 1);
        api
    }

    #[test]
    fn test_wrap_and_drop_balance_refs() {
        let api = requests();
        let rq = RequestHandle(1);
        {
            let request = Request::wrap(rq, api.clone()).unwrap();
            assert_eq!(api.refcount(rq), 2);
            assert_eq!(request.url().unwrap(), "this://app/data.json");
            assert_eq!(request.request_type().unwrap(), Some(RequestType::Get));
        }
        assert_eq!(api.refcount(rq), 1);
    }

    #[test]
    fn test_completion_changes_state() {
        let api = requests();
        let request = Request::wrap(RequestHandle(1), api.clone()).unwrap();
        assert_eq!(request.state().unwrap(), RequestState::Pending);
        request.append_data_chunk(b"{\"a\":").unwrap();
        request.succeeded(200, b"1}").unwrap();
        assert_eq!(request.state().unwrap(), RequestState::Success);
        assert_eq!(api.body(RequestHandle(1)), b"{\"a\":1}");
    }

    #[test]
    fn test_unknown_request() {
        let api = requests();
        let err = Request::wrap(RequestHandle(77), api).unwrap_err();
        assert!(err.to_string().contains("RequestUse"));
    }

    #[test]
    fn test_request_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Request>();
    }

    #[test]
    fn test_complete_from_worker() {
        let api = requests();
        let request = Request::wrap(RequestHandle(1), api.clone()).unwrap();
        std::thread::spawn(move || request.failed(404, b"").unwrap())
            .join()
            .unwrap();
        assert_eq!(api.status(RequestHandle(1)), Some(404));
        assert_eq!(api.refcount(RequestHandle(1)), 1);
    }
}
