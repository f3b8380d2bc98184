//! Hardware input capability
//!
//! The physical reader and button drivers are external. The core consumes
//! them through [`TagReader`] and [`ButtonSource`], each read blocking until
//! a physical event arrives. Claimed hardware is wrapped in a
//! [`ReleaseGuard`] so it is released on every exit path.
//!
//! Two line-oriented drivers are provided: one UID (or one `<pin> <state>`
//! edge) per line from any async reader. USB readers that act as keyboards,
//! FIFOs fed by a GPIO helper, and stdin during development all fit.

use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use tapdeck_common::ReadError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

/// Hardware that must be handed back when a worker stops
pub trait Release {
    fn release(&mut self);
}

/// Proximity reader yielding raw tag identifiers
#[async_trait]
pub trait TagReader: Release + Send {
    /// Block until a tag is presented, then return its raw UID
    async fn read_tag(&mut self) -> Result<String, ReadError>;
}

/// A level change on a button pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEdge {
    pub pin: u8,
    pub pressed: bool,
}

/// Watcher over a set of button pins
#[async_trait]
pub trait ButtonSource: Release + Send {
    /// Block until any watched pin changes level
    async fn next_edge(&mut self) -> Result<ButtonEdge, ReadError>;

    /// Drive the ready indicator, if the hardware has one
    fn set_indicator(&mut self, _on: bool) {}
}

/// Owns claimed hardware and releases it on drop
pub struct ReleaseGuard<T: Release> {
    inner: T,
}

impl<T: Release> ReleaseGuard<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: Release> Deref for ReleaseGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Release> DerefMut for ReleaseGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Release> Drop for ReleaseGuard<T> {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl<T: Release + ?Sized> Release for Box<T> {
    fn release(&mut self) {
        (**self).release();
    }
}

#[async_trait]
impl<T: TagReader + ?Sized> TagReader for Box<T> {
    async fn read_tag(&mut self) -> Result<String, ReadError> {
        (**self).read_tag().await
    }
}

#[async_trait]
impl<T: ButtonSource + ?Sized> ButtonSource for Box<T> {
    async fn next_edge(&mut self) -> Result<ButtonEdge, ReadError> {
        (**self).next_edge().await
    }

    fn set_indicator(&mut self, on: bool) {
        (**self).set_indicator(on);
    }
}

/// Reads one line, mapping end of input to [`ReadError::Disconnected`]
async fn read_line<R>(reader: &mut R, name: &str) -> Result<String, ReadError>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| ReadError::Transient(format!("{name}: {e}")))?;
    if read == 0 {
        return Err(ReadError::Disconnected(format!("{name}: end of input")));
    }
    Ok(line)
}

/// Tag reader over newline-separated UIDs
pub struct LineTagReader<R> {
    reader: Option<R>,
    name: String,
}

impl<R> LineTagReader<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader: Some(reader),
            name: name.into(),
        }
    }
}

impl<R> Release for LineTagReader<R> {
    fn release(&mut self) {
        if self.reader.take().is_some() {
            debug!(source = %self.name, "Released tag reader");
        }
    }
}

#[async_trait]
impl<R> TagReader for LineTagReader<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn read_tag(&mut self) -> Result<String, ReadError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| ReadError::Disconnected(format!("{}: released", self.name)))?;
        let line = read_line(reader, &self.name).await?;
        let uid = line.trim();
        if uid.is_empty() {
            return Err(ReadError::Transient(format!("{}: empty read", self.name)));
        }
        Ok(uid.to_string())
    }
}

/// Button source over `<pin> <state>` lines
pub struct LineButtonSource<R> {
    reader: Option<R>,
    name: String,
    indicator: bool,
}

impl<R> LineButtonSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader: Some(reader),
            name: name.into(),
            indicator: false,
        }
    }

    /// Whether the ready indicator is lit
    pub fn indicator(&self) -> bool {
        self.indicator
    }
}

/// Parse `<pin> <state>`; state is `1`/`0`, `down`/`up` or `pressed`/`released`
pub fn parse_edge(line: &str) -> Option<ButtonEdge> {
    let mut parts = line.split_whitespace();
    let pin = parts.next()?.parse().ok()?;
    let pressed = match parts.next()?.to_ascii_lowercase().as_str() {
        "1" | "down" | "pressed" => true,
        "0" | "up" | "released" => false,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(ButtonEdge { pin, pressed })
}

impl<R> Release for LineButtonSource<R> {
    fn release(&mut self) {
        self.indicator = false;
        if self.reader.take().is_some() {
            debug!(source = %self.name, "Released button source");
        }
    }
}

#[async_trait]
impl<R> ButtonSource for LineButtonSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_edge(&mut self) -> Result<ButtonEdge, ReadError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| ReadError::Disconnected(format!("{}: released", self.name)))?;
        let line = read_line(reader, &self.name).await?;
        parse_edge(&line).ok_or_else(|| {
            ReadError::Transient(format!("{}: malformed edge {:?}", self.name, line.trim()))
        })
    }

    fn set_indicator(&mut self, on: bool) {
        if self.indicator != on {
            debug!(source = %self.name, on, "Ready indicator");
        }
        self.indicator = on;
    }
}
