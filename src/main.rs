fn main() -> anyhow::Result<()> {
    let command_line_interface = hintcheck::cli::CommandLineInterface::load();
    command_line_interface.run()
}
