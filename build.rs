fn main() {
    // embedded by sqlx::migrate!
    println!("cargo:rerun-if-changed=migrations");
}
