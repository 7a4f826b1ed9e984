//! Read only API consumed by the public frontends, behind the same authentication
//! as the admin panel

pub(super) mod posts;
pub(super) mod user;
