use crate::upgrade::BuildInfo;

/// `ask version`
pub fn execute(build: &BuildInfo) {
    println!("{}", build.long_version());
}
