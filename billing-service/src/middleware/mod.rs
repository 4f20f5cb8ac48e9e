pub mod actor;

pub use actor::{ActorContext, AdminContext, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
