// SPDX-License-Identifier: Apache-2.0

use colored::Colorize;

pub fn report_cli_error_and_exit(message: &str, details: Vec<(&str, &str)>) -> ! {
    eprintln!("depsched-driver: {}", message.red().bold());
    for (key, value) in details {
        eprintln!("  {}: {}", key, value);
    }
    std::process::exit(1);
}
