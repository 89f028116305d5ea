pub use super::users::Entity as Users;
