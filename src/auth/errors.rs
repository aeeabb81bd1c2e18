/// Map a backend auth error code to the sentence shown to the user.
pub fn auth_error_message(code: &str) -> &'static str {
    match code {
        "auth/invalid-email" => "Invalid email address",
        "auth/user-disabled" => "This account has been disabled",
        "auth/user-not-found" => "No account found with this email",
        "auth/wrong-password" => "Incorrect password",
        "auth/email-already-in-use" => "An account with this email already exists",
        "auth/weak-password" => "Password is too weak. Please use at least 6 characters",
        "auth/operation-not-allowed" => "This operation is not allowed",
        "auth/too-many-requests" => "Too many failed attempts. Please try again later",
        "auth/network-request-failed" => "Network error. Please check your connection",
        "auth/invalid-credential" => "Invalid email or password",
        _ => "An error occurred. Please try again",
    }
}
