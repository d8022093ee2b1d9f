fn main() -> std::process::ExitCode {
    vlsm_deploy_lib::run()
}
