//! 网关 SSE 流解码与下游 SSE 编码
//!
//! 上游以任意方式切分字节块，解码器按行缓冲，只处理 `data: ` 行。
//! 收到 `data: [DONE]` 之后不再产生任何输出。

use serde_json::Value;

pub const SSE_DONE: &str = "data: [DONE]\n\n";

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// 输入一个字节块，返回其中完整行解析出的增量文本
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.done {
            return deltas;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&line[..line.len() - 1], &mut deltas);
            if self.done {
                self.buffer.clear();
                break;
            }
        }

        deltas
    }

    /// 流结束时处理缓冲区中没有换行结尾的残余
    pub fn finish(&mut self) -> Vec<String> {
        let mut deltas = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            for line in rest.split(|b| *b == b'\n') {
                self.handle_line(line, &mut deltas);
                if self.done {
                    break;
                }
            }
        }
        self.buffer.clear();
        deltas
    }

    fn handle_line(&mut self, raw: &[u8], deltas: &mut Vec<String>) {
        let line = String::from_utf8_lossy(raw);
        let line = line.strip_suffix('\r').unwrap_or(&line);

        if line.is_empty() || line.starts_with(':') {
            return;
        }
        let Some(payload) = line.strip_prefix("data: ") else {
            return;
        };
        let payload = payload.trim();

        if payload == "[DONE]" {
            self.done = true;
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(json) => {
                if let Some(content) = json
                    .pointer("/choices/0/delta/content")
                    .and_then(Value::as_str)
                    && !content.is_empty()
                {
                    deltas.push(content.to_string());
                }
            }
            Err(e) => log::debug!("Skipping malformed SSE payload: {e}"),
        }
    }
}

/// 下游事件：`data: {"content": "..."}`
pub fn encode_content_event(content: &str) -> String {
    format!("data: {}\n\n", serde_json::json!({ "content": content }))
}

pub fn encode_error_event(message: &str) -> String {
    format!("data: {}\n\n", serde_json::json!({ "error": message }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    #[test]
    fn test_decodes_split_chunks() {
        let mut decoder = SseDecoder::new();
        let line = delta("Hello");
        let (a, b) = line.as_bytes().split_at(10);

        assert!(decoder.push(a).is_empty());
        assert_eq!(decoder.push(b), vec!["Hello".to_string()]);
    }

    #[test]
    fn test_ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let input = format!(": keep-alive\nevent: ping\n\r\n{}", delta("Hi"));
        assert_eq!(decoder.push(input.as_bytes()), vec!["Hi".to_string()]);
    }

    #[test]
    fn test_handles_crlf_lines() {
        let mut decoder = SseDecoder::new();
        let input = delta("x").replace('\n', "\r\n");
        assert_eq!(decoder.push(input.as_bytes()), vec!["x".to_string()]);
    }

    #[test]
    fn test_stops_after_done() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}data: [DONE]\n{}", delta("a"), delta("b"));

        assert_eq!(decoder.push(input.as_bytes()), vec!["a".to_string()]);
        assert!(decoder.is_done());
        assert!(decoder.push(delta("c").as_bytes()).is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        let line = delta("tail");
        assert!(decoder.push(line.trim_end().as_bytes()).is_empty());
        assert_eq!(decoder.finish(), vec!["tail".to_string()]);
    }

    #[test]
    fn test_encode_events() {
        assert_eq!(encode_content_event("hi"), "data: {\"content\":\"hi\"}\n\n");
        assert_eq!(SSE_DONE, "data: [DONE]\n\n");
    }
}
