//! Access evaluation for group attributes
//!
//! Pure functions: nothing here reads or writes group state beyond the
//! arguments passed in.

use super::errors::{GroupError, GroupResult};
use super::types::{AccessRequired, Member, UserId};

/// Check whether `acting` may change `attribute`
///
/// When `affected` names the acting member itself the change is always
/// allowed, whatever `required` says.
pub fn verify_access(
    attribute: &str,
    acting: Option<&Member>,
    required: AccessRequired,
    affected: Option<&UserId>,
) -> GroupResult<()> {
    if let (Some(member), Some(target)) = (acting, affected) {
        if &member.user_id == target {
            return Ok(());
        }
    }

    match required {
        AccessRequired::Any => Ok(()),
        AccessRequired::Member => match acting {
            Some(_) => Ok(()),
            None => Err(GroupError::access_denied(attribute, "requires a current member")),
        },
        AccessRequired::Administrator => match acting {
            Some(member) if member.role.is_administrator() => Ok(()),
            Some(_) => Err(GroupError::access_denied(attribute, "requires an administrator")),
            None => Err(GroupError::access_denied(
                attribute,
                "requires an administrator, caller is not a member",
            )),
        },
        AccessRequired::Unsatisfiable => {
            Err(GroupError::access_denied(attribute, "attribute is locked"))
        }
        AccessRequired::Unknown => Err(GroupError::access_denied(
            attribute,
            "access level is not configured",
        )),
    }
}
