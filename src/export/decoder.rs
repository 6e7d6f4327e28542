//! Streaming decoder for a JSON array of objects
//!
//! Reads the array one element at a time from an async byte stream: the
//! opening bracket, then complete objects while more remain, then the
//! closing bracket. Only the element currently being decoded is buffered.

use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{DecodeError, Result, ScratchError};

/// Token-level decoder over a JSON array of objects
pub struct ArrayDecoder<R> {
    reader: R,
    /// Raw bytes of the element being decoded
    element: Vec<u8>,
    /// Elements decoded so far
    elements: u64,
}

fn is_json_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

fn unexpected(expected: &str, found: u8) -> ScratchError {
    DecodeError::UnexpectedToken {
        expected: expected.to_string(),
        found: (found as char).to_string(),
    }
    .into()
}

impl<R: AsyncBufRead + Unpin> ArrayDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            element: Vec::new(),
            elements: 0,
        }
    }

    /// Consume the opening `[`
    pub async fn open(&mut self) -> Result<()> {
        self.expect(b'[').await
    }

    /// Whether another element follows
    pub async fn more(&mut self) -> Result<bool> {
        match self.skip_whitespace().await? {
            Some(b']') => Ok(false),
            Some(_) => Ok(true),
            None => Err(DecodeError::UnexpectedEof.into()),
        }
    }

    /// Decode the next element into an ordered map
    pub async fn next_object(&mut self) -> Result<Map<String, Value>> {
        if self.elements > 0 {
            self.expect(b',').await?;
        }
        match self.skip_whitespace().await? {
            Some(b'{') => {}
            Some(other) => return Err(unexpected("{", other)),
            None => return Err(DecodeError::UnexpectedEof.into()),
        }

        self.element.clear();
        self.scan_object().await?;
        let object = serde_json::from_slice(&self.element)
            .map_err(|e| DecodeError::InvalidElement(e.to_string()))?;
        self.elements += 1;
        Ok(object)
    }

    /// Consume the closing `]` and verify nothing but whitespace follows
    pub async fn close(&mut self) -> Result<()> {
        self.expect(b']').await?;
        match self.skip_whitespace().await? {
            None => Ok(()),
            Some(_) => Err(DecodeError::TrailingData.into()),
        }
    }

    /// Number of elements decoded so far
    pub fn elements(&self) -> u64 {
        self.elements
    }

    async fn fill(&mut self) -> Result<&[u8]> {
        self.reader
            .fill_buf()
            .await
            .map_err(ScratchError::from_pipe_read)
    }

    /// Skip whitespace and return the next byte without consuming it
    async fn skip_whitespace(&mut self) -> Result<Option<u8>> {
        loop {
            let (skip, next) = {
                let buf = self.fill().await?;
                if buf.is_empty() {
                    return Ok(None);
                }
                let skip = buf.iter().take_while(|b| is_json_whitespace(**b)).count();
                (skip, buf.get(skip).copied())
            };
            self.reader.consume(skip);
            if next.is_some() {
                return Ok(next);
            }
        }
    }

    async fn expect(&mut self, token: u8) -> Result<()> {
        match self.skip_whitespace().await? {
            Some(b) if b == token => {
                self.reader.consume(1);
                Ok(())
            }
            Some(b) => Err(unexpected(&(token as char).to_string(), b)),
            None => Err(DecodeError::UnexpectedEof.into()),
        }
    }

    /// Copy one complete object into `self.element`
    ///
    /// Tracks nesting depth outside of string literals; the reader must be
    /// positioned on the opening `{`.
    async fn scan_object(&mut self) -> Result<()> {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        loop {
            let (taken, done) = {
                let buf = self.reader.fill_buf().await.map_err(ScratchError::from_pipe_read)?;
                if buf.is_empty() {
                    return Err(DecodeError::UnexpectedEof.into());
                }

                let mut end = None;
                for (i, &b) in buf.iter().enumerate() {
                    if in_string {
                        if escaped {
                            escaped = false;
                        } else if b == b'\\' {
                            escaped = true;
                        } else if b == b'"' {
                            in_string = false;
                        }
                        continue;
                    }
                    match b {
                        b'"' => in_string = true,
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                end = Some(i + 1);
                                break;
                            }
                        }
                        _ => {}
                    }
                }

                let taken = end.unwrap_or(buf.len());
                self.element.extend_from_slice(&buf[..taken]);
                (taken, end.is_some())
            };
            self.reader.consume(taken);
            if done {
                return Ok(());
            }
        }
    }
}
