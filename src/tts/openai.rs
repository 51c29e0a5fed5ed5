//! OpenAI-compatible `/audio/speech` synthesizer.
//!
//! The response body is consumed as a byte stream so playback can start
//! before synthesis finishes. Telephony output is requested as 24 kHz PCM
//! and transcoded to 8 kHz u-law chunk by chunk.

use crate::audio::codec::MulawTranscoder;
use crate::defaults;
use crate::error::{Result, VoxgateError};
use crate::http::{ApiEndpoint, build_client, describe_failure};
use crate::tts::synthesizer::{AudioChunkStream, AudioEncoding, SpeechSynthesizer, SynthesisRequest};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
}

#[derive(Debug, Clone)]
pub struct OpenAiSynthesizer {
    client: reqwest::Client,
    endpoint: ApiEndpoint,
}

impl OpenAiSynthesizer {
    pub fn new(endpoint: ApiEndpoint, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint,
        })
    }
}

fn stream_error(e: reqwest::Error) -> VoxgateError {
    VoxgateError::SynthesisService {
        message: format!("Synthesis stream interrupted: {e}"),
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioChunkStream> {
        let response_format = match request.encoding {
            AudioEncoding::Mp3 => "mp3",
            AudioEncoding::Mulaw8k => "pcm",
        };
        let response = self
            .endpoint
            .authorize(self.client.post(self.endpoint.url("audio/speech")))
            .json(&SpeechRequest {
                model: &request.model,
                voice: &request.voice_id,
                input: &request.text,
                response_format,
            })
            .send()
            .await
            .map_err(|e| VoxgateError::SynthesisService {
                message: format!("Synthesis request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(VoxgateError::SynthesisService {
                message: describe_failure(response).await,
            });
        }

        let body = response.bytes_stream();
        match request.encoding {
            AudioEncoding::Mp3 => Ok(Box::pin(
                body.map(|chunk| chunk.map(|b| b.to_vec()).map_err(stream_error)),
            )),
            AudioEncoding::Mulaw8k => {
                let transcoder = MulawTranscoder::new(defaults::SYNTHESIS_PCM_RATE)?;
                let chunks = stream::unfold(
                    (Box::pin(body), Some(transcoder)),
                    |(mut body, transcoder)| async move {
                        let mut transcoder = transcoder?;
                        loop {
                            match body.next().await {
                                Some(Ok(pcm)) => {
                                    let ulaw = transcoder.push(&pcm);
                                    if !ulaw.is_empty() {
                                        return Some((Ok(ulaw), (body, Some(transcoder))));
                                    }
                                }
                                Some(Err(e)) => return Some((Err(stream_error(e)), (body, None))),
                                None => {
                                    let tail = transcoder.finish();
                                    return (!tail.is_empty()).then_some((Ok(tail), (body, None)));
                                }
                            }
                        }
                    },
                );
                Ok(Box::pin(chunks))
            }
        }
    }
}
