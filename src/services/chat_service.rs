use crate::error::{AppError, AppResult};
use crate::external::AiGatewayService;
use crate::models::*;
use crate::utils::sse::{SSE_DONE, SseDecoder, encode_content_event, encode_error_event};
use actix_web::web::Bytes;
use futures_util::{Stream, StreamExt, stream};
use std::collections::VecDeque;
use std::convert::Infallible;

const MAX_MESSAGES: usize = 50;
const MAX_PROMPT_CHARS: usize = 4000;

#[derive(Clone)]
pub struct ChatService {
    gateway: AiGatewayService,
}

impl ChatService {
    pub fn new(gateway: AiGatewayService) -> Self {
        Self { gateway }
    }

    /// 转发对话到网关，返回规范化后的 SSE 流
    pub async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> AppResult<impl Stream<Item = Result<Bytes, Infallible>> + use<>> {
        if request.messages.is_empty() {
            return Err(AppError::ValidationError("Messages are required".to_string()));
        }
        if request.messages.len() > MAX_MESSAGES {
            return Err(AppError::ValidationError("Conversation is too long".to_string()));
        }

        let upstream = self.gateway.stream_chat(&request.messages).await?;
        Ok(normalize_sse(upstream))
    }

    pub async fn generate_image(&self, request: ImageRequest) -> AppResult<ImageResponse> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(AppError::ValidationError("Prompt is required".to_string()));
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(AppError::ValidationError("Prompt is too long".to_string()));
        }
        self.gateway.generate_image(prompt).await
    }
}

struct SseState<S> {
    upstream: S,
    decoder: SseDecoder,
    pending: VecDeque<Bytes>,
    finished: bool,
}

impl<S> SseState<S> {
    fn queue_deltas(&mut self, deltas: Vec<String>) {
        self.pending
            .extend(deltas.iter().map(|d| Bytes::from(encode_content_event(d))));
    }

    fn finish(&mut self) {
        self.pending.push_back(Bytes::from_static(SSE_DONE.as_bytes()));
        self.finished = true;
    }
}

/// 上游 SSE 字节流 → `data: {"content": ...}` 事件，最后总是 `data: [DONE]`
///
/// 上游出错时先发出一条 error 事件再结束。
pub fn normalize_sse<S, E>(upstream: S) -> impl Stream<Item = Result<Bytes, Infallible>> + 'static
where
    S: Stream<Item = Result<Bytes, E>> + 'static,
    E: std::fmt::Display,
{
    let state = SseState {
        upstream: Box::pin(upstream),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(bytes) = st.pending.pop_front() {
                return Some((Ok(bytes), st));
            }
            if st.finished {
                return None;
            }

            match st.upstream.next().await {
                Some(Ok(chunk)) => {
                    let deltas = st.decoder.push(&chunk);
                    st.queue_deltas(deltas);
                    if st.decoder.is_done() {
                        st.finish();
                    }
                }
                Some(Err(e)) => {
                    log::error!("AI gateway stream interrupted: {e}");
                    st.pending
                        .push_back(Bytes::from(encode_error_event("Stream interrupted")));
                    st.finish();
                }
                None => {
                    let deltas = st.decoder.finish();
                    st.queue_deltas(deltas);
                    st.finish();
                }
            }
        }
    })
}
