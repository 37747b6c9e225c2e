//! HTTP request handlers.
//!
//! - [`upload`]: accepts a video, runs the transcoder and publishes the timelapse
//! - [`health`]: reports whether the transcoder can be found
//!
//! Handlers return [`crate::errors::Error`], which converts into a status code and a JSON
//! [`ErrorResponse`](crate::api::models::ErrorResponse) body.

pub mod health;
pub mod upload;
