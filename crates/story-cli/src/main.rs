use std::process;

fn main() {
    story_cli::init_tracing();

    match story_cli::run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("obs-editor error: {err:#}");
            process::exit(story_cli::exit_code_for(&err) as i32);
        }
    }
}
