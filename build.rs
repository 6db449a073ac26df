use vergen_gitcl::{Emitter, Gitcl};

// Embeds VERGEN_GIT_BRANCH, VERGEN_GIT_SHA and VERGEN_GIT_DIRTY for the
// `/health` version string.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let gitcl = Gitcl::builder().branch(true).sha(true).dirty(true).build();
    Emitter::default().add_instructions(&gitcl)?.emit()?;
    Ok(())
}
