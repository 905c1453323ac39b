pub mod calendar;
pub mod lifecycle;
pub mod mail;
pub mod notifications;
pub mod reconciler;
pub mod scheduling;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;
