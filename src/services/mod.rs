pub(crate) mod events;
pub(crate) mod exam_session;
pub(crate) mod login;
pub(crate) mod stores;
