//! Document path builders

pub const BOXES: &str = "boxes";
pub const BOX_CODES: &str = "boxCodes";
pub const USERS: &str = "users";

pub fn box_doc(box_id: &str) -> String {
    format!("{}/{}", BOXES, box_id)
}

pub fn packages(box_id: &str) -> String {
    format!("{}/packages", box_doc(box_id))
}

pub fn package_doc(box_id: &str, package_id: &str) -> String {
    format!("{}/{}", packages(box_id), package_id)
}

pub fn steps(box_id: &str, package_id: &str) -> String {
    format!("{}/steps", package_doc(box_id, package_id))
}

pub fn step_doc(box_id: &str, package_id: &str, step_id: &str) -> String {
    format!("{}/{}", steps(box_id, package_id), step_id)
}

pub fn claim_code(code: &str) -> String {
    format!("{}/{}", BOX_CODES, code)
}

pub fn user_doc(uid: &str) -> String {
    format!("{}/{}", USERS, uid)
}

/// Whether `path` is a direct child document of `collection`
pub fn is_child_of(path: &str, collection: &str) -> bool {
    path.strip_prefix(collection)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|id| !id.is_empty() && !id.contains('/'))
        .unwrap_or(false)
}
