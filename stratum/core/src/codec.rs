// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::error::{Result, SchedulerError};
use crate::task::{Task, TaskResult};
use async_trait::async_trait;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use url::Url;

/// Tagged replacement for the source's integer `flag` field
/// (`flag = (remote? 2 : 0) + (generic-codec? 1 : 0)`): which codec produced
/// a result payload, and whether the payload is inline or must be fetched
/// from a URL first. The wire format (the two-bit flag prefixing the
/// payload) is unchanged; only the in-memory representation is a closed
/// enum instead of arithmetic on an int.
#[derive(Debug, Clone)]
pub enum ResultEncoding {
    InlineFast,
    InlineGeneric,
    RemoteFast(Url),
    RemoteGeneric(Url),
}

impl ResultEncoding {
    pub fn flag(&self) -> u8 {
        match self {
            ResultEncoding::InlineFast => 0,
            ResultEncoding::InlineGeneric => 1,
            ResultEncoding::RemoteFast(_) => 2,
            ResultEncoding::RemoteGeneric(_) => 3,
        }
    }

    /// Decode a `(flag, payload)` pair as reported over the wire. `payload`
    /// is either the inline bytes or, for `flag >= 2`, a URL string.
    pub fn decode(flag: u8, payload: &[u8]) -> Result<Self> {
        match flag {
            0 => Ok(ResultEncoding::InlineFast),
            1 => Ok(ResultEncoding::InlineGeneric),
            2 | 3 => {
                let url_str = std::str::from_utf8(payload)
                    .map_err(|e| SchedulerError::Serde(e.to_string()))?;
                let url = Url::parse(url_str).map_err(|e| SchedulerError::Serde(e.to_string()))?;
                if flag == 2 {
                    Ok(ResultEncoding::RemoteFast(url))
                } else {
                    Ok(ResultEncoding::RemoteGeneric(url))
                }
            }
            other => Err(SchedulerError::Serde(format!("unknown result flag {other}"))),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ResultEncoding::RemoteFast(_) | ResultEncoding::RemoteGeneric(_))
    }
}

pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| SchedulerError::Serde(e.to_string()))?;
    encoder.finish().map_err(|e| SchedulerError::Serde(e.to_string()))
}

pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| SchedulerError::Serde(e.to_string()))?;
    Ok(out)
}

/// Decodes task-result payloads. The task-result type itself is out of
/// scope for the scheduler (see `SPEC_FULL.md` §1), so the embedder supplies
/// one of these -- analogous to the upstream scheduler's pluggable logical
/// / physical plan codec.
pub trait ResultDecoder: Send + Sync {
    /// Decode bytes produced by the "fast numeric/structural" codec
    /// (`flag == 0`).
    fn decode_fast(&self, bytes: &[u8]) -> Result<TaskResult>;
    /// Decode bytes produced by the "general-object" codec (`flag == 1`).
    fn decode_generic(&self, bytes: &[u8]) -> Result<TaskResult>;
}

/// Serializes a task for launch. Out of scope for the scheduler itself, like
/// `ResultDecoder` above -- the embedder owns the task body's wire format.
pub trait TaskSerializer: Send + Sync {
    fn serialize(&self, task: &Task) -> Result<Vec<u8>>;
}

/// Fetches a remote blob referenced by a `RemoteFast`/`RemoteGeneric`
/// result encoding. The cluster scheduler retries exactly once on I/O
/// error, per `SPEC_FULL.md` §4.3.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

/// Decodes a status-update result payload end to end: decompress, resolve
/// any remote indirection (retrying once), then hand the inline bytes to
/// the matching `ResultDecoder` method.
pub async fn resolve_result(
    flag: u8,
    payload: &[u8],
    decoder: &dyn ResultDecoder,
    fetcher: &dyn RemoteFetcher,
) -> Result<TaskResult> {
    let encoding = ResultEncoding::decode(flag, payload)?;
    let (is_generic, bytes) = match encoding {
        ResultEncoding::InlineFast => (false, payload.to_vec()),
        ResultEncoding::InlineGeneric => (true, payload.to_vec()),
        ResultEncoding::RemoteFast(url) => (false, fetch_with_retry(&url, fetcher).await?),
        ResultEncoding::RemoteGeneric(url) => (true, fetch_with_retry(&url, fetcher).await?),
    };
    let decompressed = decompress(&bytes)?;
    if is_generic {
        decoder.decode_generic(&decompressed)
    } else {
        decoder.decode_fast(&decompressed)
    }
}

async fn fetch_with_retry(url: &Url, fetcher: &dyn RemoteFetcher) -> Result<Vec<u8>> {
    match fetcher.fetch(url).await {
        Ok(bytes) => Ok(bytes),
        Err(_) => fetcher.fetch(url).await,
    }
}
