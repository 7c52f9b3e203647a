use starshop_db::models::order::PaymentMethod;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Telegram rejects callback payloads longer than this.
pub const MAX_CALLBACK_LEN: usize = 64;

/// Every inline-button press the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Buy,
    BuyForSelf,
    BuyForFriend,
    ConfirmRecipient,
    Cancel,
    PayWith { method: PaymentMethod },
    ConfirmPayment,
    CheckInvoice,
    Approve { order_id: i64 },
    Reject { order_id: i64 },
    Profile,
    Orders,
    Referral,
    Support,
    Faq,
    DeleteAccount,
    Home,
    AdminPending,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionParseError {
    #[error("empty callback payload")]
    Empty,
    #[error("callback payload exceeds {MAX_CALLBACK_LEN} bytes")]
    TooLong,
    #[error("unknown action: {0}")]
    Unknown(String),
    #[error("action {0} requires an argument")]
    MissingArgument(&'static str),
    #[error("action {tag} got an unexpected argument: {value}")]
    UnexpectedArgument { tag: &'static str, value: String },
    #[error("action {tag} has an invalid argument: {value}")]
    BadArgument { tag: &'static str, value: String },
}

impl Action {
    pub fn encode(&self) -> String {
        match self {
            Action::Buy => "buy".to_string(),
            Action::BuyForSelf => "buy:self".to_string(),
            Action::BuyForFriend => "buy:friend".to_string(),
            Action::ConfirmRecipient => "buy:confirm".to_string(),
            Action::Cancel => "cancel".to_string(),
            Action::PayWith { method } => format!("pay:{}", method),
            Action::ConfirmPayment => "paid".to_string(),
            Action::CheckInvoice => "check".to_string(),
            Action::Approve { order_id } => format!("approve:{}", order_id),
            Action::Reject { order_id } => format!("reject:{}", order_id),
            Action::Profile => "profile".to_string(),
            Action::Orders => "orders".to_string(),
            Action::Referral => "referral".to_string(),
            Action::Support => "support".to_string(),
            Action::Faq => "faq".to_string(),
            Action::DeleteAccount => "delete_account".to_string(),
            Action::Home => "home".to_string(),
            Action::AdminPending => "admin:pending".to_string(),
        }
    }

    pub fn decode(data: &str) -> Result<Self, ActionParseError> {
        if data.is_empty() {
            return Err(ActionParseError::Empty);
        }
        if data.len() > MAX_CALLBACK_LEN {
            return Err(ActionParseError::TooLong);
        }

        let (tag, arg) = match data.split_once(':') {
            Some((tag, arg)) => (tag, Some(arg)),
            None => (data, None),
        };

        let action = match (tag, arg) {
            ("buy", None) => Action::Buy,
            ("buy", Some("self")) => Action::BuyForSelf,
            ("buy", Some("friend")) => Action::BuyForFriend,
            ("buy", Some("confirm")) => Action::ConfirmRecipient,
            ("buy", Some(other)) => {
                return Err(ActionParseError::BadArgument {
                    tag: "buy",
                    value: other.to_string(),
                });
            }
            ("pay", Some(method)) => Action::PayWith {
                method: method.parse().map_err(|_| ActionParseError::BadArgument {
                    tag: "pay",
                    value: method.to_string(),
                })?,
            },
            ("pay", None) => return Err(ActionParseError::MissingArgument("pay")),
            ("approve", arg) => Action::Approve {
                order_id: parse_order_id("approve", arg)?,
            },
            ("reject", arg) => Action::Reject {
                order_id: parse_order_id("reject", arg)?,
            },
            ("admin", Some("pending")) => Action::AdminPending,
            ("admin", Some(other)) => {
                return Err(ActionParseError::BadArgument {
                    tag: "admin",
                    value: other.to_string(),
                });
            }
            ("admin", None) => return Err(ActionParseError::MissingArgument("admin")),
            (tag, arg) => {
                let action = match tag {
                    "cancel" => Action::Cancel,
                    "paid" => Action::ConfirmPayment,
                    "check" => Action::CheckInvoice,
                    "profile" => Action::Profile,
                    "orders" => Action::Orders,
                    "referral" => Action::Referral,
                    "support" => Action::Support,
                    "faq" => Action::Faq,
                    "delete_account" => Action::DeleteAccount,
                    "home" => Action::Home,
                    other => return Err(ActionParseError::Unknown(other.to_string())),
                };
                if let Some(value) = arg {
                    return Err(ActionParseError::UnexpectedArgument {
                        tag: action.tag(),
                        value: value.to_string(),
                    });
                }
                action
            }
        };

        Ok(action)
    }

    fn tag(&self) -> &'static str {
        match self {
            Action::Buy | Action::BuyForSelf | Action::BuyForFriend | Action::ConfirmRecipient => {
                "buy"
            }
            Action::Cancel => "cancel",
            Action::PayWith { .. } => "pay",
            Action::ConfirmPayment => "paid",
            Action::CheckInvoice => "check",
            Action::Approve { .. } => "approve",
            Action::Reject { .. } => "reject",
            Action::Profile => "profile",
            Action::Orders => "orders",
            Action::Referral => "referral",
            Action::Support => "support",
            Action::Faq => "faq",
            Action::DeleteAccount => "delete_account",
            Action::Home => "home",
            Action::AdminPending => "admin",
        }
    }
}

fn parse_order_id(tag: &'static str, arg: Option<&str>) -> Result<i64, ActionParseError> {
    let raw = arg.ok_or(ActionParseError::MissingArgument(tag))?;
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ActionParseError::BadArgument {
            tag,
            value: raw.to_string(),
        }),
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::decode(s)
    }
}
