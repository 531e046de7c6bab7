use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Free-form string-keyed attributes.
pub type Attributes = BTreeMap<String, Value>;

/// The flattened evaluation input, keyed by dotted field names such as `user.id` or `other.plan`.
pub type Fields = BTreeMap<String, Value>;

pub(crate) const ID: &str = "id";
pub(crate) const NAME: &str = "name";
pub(crate) const EMAIL: &str = "email";
pub(crate) const AVATAR: &str = "avatar";

/// Describes a user.
///
/// # Examples:
///
/// ```rust
/// use bucket::User;
///
/// let user = User::new("user-id")
///     .name("John")
///     .email("john@example.com")
///     .custom("plan", "enterprise")
///     .custom("seats", 12);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct User {
    id: String,
    name: Option<String>,
    email: Option<String>,
    avatar: Option<String>,
    attributes: Attributes,
}

impl User {
    /// Initializes a new [`User`].
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            ..User::default()
        }
    }

    /// Display name of the user.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Email address of the user.
    pub fn email(mut self, email: &str) -> Self {
        self.email = Some(email.to_owned());
        self
    }

    /// Avatar URL of the user.
    pub fn avatar(mut self, avatar: &str) -> Self {
        self.avatar = Some(avatar.to_owned());
        self
    }

    /// Custom attribute of the user. Declared attributes (`id`, `name`, ...) win over custom ones with the same key.
    pub fn custom<T: Into<Value>>(mut self, key: &str, value: T) -> Self {
        self.attributes.insert(key.to_owned(), value.into());
        self
    }

    /// The identifier of the user.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn attributes(&self) -> Attributes {
        merge_declared(
            &self.attributes,
            None,
            &[
                (NAME, &self.name),
                (EMAIL, &self.email),
                (AVATAR, &self.avatar),
            ],
        )
    }

    fn flatten_into(&self, fields: &mut Fields) {
        let all = merge_declared(
            &self.attributes,
            Some(&self.id),
            &[
                (NAME, &self.name),
                (EMAIL, &self.email),
                (AVATAR, &self.avatar),
            ],
        );
        for (k, v) in all {
            fields.insert(format!("user.{k}"), v);
        }
    }
}

/// Describes a company.
///
/// # Examples:
///
/// ```rust
/// use bucket::Company;
///
/// let company = Company::new("company-id")
///     .name("Acme")
///     .custom("tier", "gold");
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Company {
    id: String,
    name: Option<String>,
    avatar: Option<String>,
    attributes: Attributes,
}

impl Company {
    /// Initializes a new [`Company`].
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            ..Company::default()
        }
    }

    /// Display name of the company.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Avatar URL of the company.
    pub fn avatar(mut self, avatar: &str) -> Self {
        self.avatar = Some(avatar.to_owned());
        self
    }

    /// Custom attribute of the company.
    pub fn custom<T: Into<Value>>(mut self, key: &str, value: T) -> Self {
        self.attributes.insert(key.to_owned(), value.into());
        self
    }

    /// The identifier of the company.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn attributes(&self) -> Attributes {
        merge_declared(
            &self.attributes,
            None,
            &[(NAME, &self.name), (AVATAR, &self.avatar)],
        )
    }

    fn flatten_into(&self, fields: &mut Fields) {
        let all = merge_declared(
            &self.attributes,
            Some(&self.id),
            &[(NAME, &self.name), (AVATAR, &self.avatar)],
        );
        for (k, v) in all {
            fields.insert(format!("company.{k}"), v);
        }
    }
}

fn merge_declared(
    custom: &Attributes,
    id: Option<&String>,
    declared: &[(&str, &Option<String>)],
) -> Attributes {
    let mut merged = custom.clone();
    if let Some(id) = id {
        merged.insert(ID.to_owned(), Value::from(id.as_str()));
    }
    for (key, value) in declared {
        if let Some(value) = value {
            merged.insert((*key).to_owned(), Value::from(value.as_str()));
        }
    }
    merged
}

/// The evaluation context: an optional user, an optional company and free-form attributes.
///
/// # Examples:
///
/// ```rust
/// use bucket::{Company, Context, User};
///
/// let context = Context::new()
///     .user(User::new("user-id"))
///     .company(Company::new("company-id"))
///     .other("page", "checkout");
///
/// let fields = context.to_fields();
/// assert_eq!(fields["user.id"].to_string(), "user-id");
/// assert_eq!(fields["other.page"].to_string(), "checkout");
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Context {
    user: Option<User>,
    company: Option<Company>,
    other: Attributes,
}

impl Context {
    /// Initializes an empty [`Context`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user of the context.
    pub fn user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// Sets the company of the context.
    pub fn company(mut self, company: Company) -> Self {
        self.company = Some(company);
        self
    }

    /// Adds a free-form attribute, exposed to targeting as `other.<key>`.
    pub fn other<T: Into<Value>>(mut self, key: &str, value: T) -> Self {
        self.other.insert(key.to_owned(), value.into());
        self
    }

    /// The user of the context, if any.
    pub fn get_user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// The company of the context, if any.
    pub fn get_company(&self) -> Option<&Company> {
        self.company.as_ref()
    }

    /// Flattens the context into the field map used for evaluation.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        for (k, v) in self.other.iter() {
            fields.insert(format!("other.{k}"), v.clone());
        }
        if let Some(company) = self.company.as_ref() {
            company.flatten_into(&mut fields);
        }
        if let Some(user) = self.user.as_ref() {
            user.flatten_into(&mut fields);
        }
        fields
    }

    pub(crate) fn to_shared_fields(&self) -> Arc<Fields> {
        Arc::new(self.to_fields())
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(&self.to_fields()) {
            Ok(str) => write!(f, "{str}"),
            Err(_) => f.write_str("<invalid context>"),
        }
    }
}

/// Controls how user and company updates sent alongside a feature request mark the entity's activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingStrategy {
    /// Updates are sent without touching the activity marker.
    #[default]
    Default,
    /// Updates mark the entity as active.
    Active,
    /// Updates leave the entity's last-seen time untouched.
    Inactive,
    /// No updates are sent.
    Disabled,
}

impl TrackingStrategy {
    pub(crate) fn active_flag(&self) -> Option<bool> {
        match self {
            TrackingStrategy::Active => Some(true),
            TrackingStrategy::Inactive => Some(false),
            TrackingStrategy::Default | TrackingStrategy::Disabled => None,
        }
    }
}
