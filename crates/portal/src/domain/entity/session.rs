/// The signed-in user attached to a request by the session middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub token: String,
    pub handle: String,
    pub email: String,
    pub display_name: Option<String>,
    pub email_verified: bool,
}
