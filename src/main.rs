fn main() {
    if let Err(err) = agent_chat::cli::main() {
        eprintln!("❌ Error: {err}");
        std::process::exit(1);
    }
}
