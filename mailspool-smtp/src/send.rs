//! Render-and-deliver in one call, without a spooler in between.

use mailspool_common::{MalformedMessageError, Message, RenderError, addressing, render};
use thiserror::Error;

use crate::{credentials::Credentials, error::DeliveryError, transport::Transport};

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// The SMTP envelope of `message`: the bare sender address and the bare
/// recipient addresses, in order.
///
/// # Errors
///
/// [`MalformedMessageError`] if the sender or the recipient list is absent,
/// or an address could not be written on a command line.
pub fn envelope<M: Message + ?Sized>(
    message: &M,
) -> Result<(String, Vec<String>), MalformedMessageError> {
    let (from, to) = addressing(message)?;

    Ok((
        from.address().to_string(),
        to.iter().map(|mailbox| mailbox.address().to_string()).collect(),
    ))
}

/// Render `message` and hand it to `transport` immediately.
///
/// # Errors
///
/// [`SendError::Render`] when the message cannot be rendered (nothing is
/// sent), [`SendError::Delivery`] when the transport fails.
pub async fn send<M: Message + ?Sized>(
    message: &M,
    transport: &dyn Transport,
    credentials: Option<&Credentials>,
    endpoint: &str,
) -> Result<(), SendError> {
    let payload = render(message)?;
    let (from, to) = envelope(message).map_err(RenderError::from)?;

    transport
        .deliver(&payload, &from, &to, credentials, endpoint)
        .await?;

    Ok(())
}
