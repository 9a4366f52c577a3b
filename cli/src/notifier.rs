//! Prints newly found donations to the terminal

use async_trait::async_trait;
use colored::Colorize;
use stealth_scanner::{DonationRecord, Notifier};

use crate::commands::print_donation;

pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, donations: Vec<DonationRecord>) {
        if donations.is_empty() {
            return;
        }
        println!();
        println!(
            "{}",
            format!("{} new donation(s) received", donations.len()).green().bold()
        );
        for (i, donation) in donations.iter().enumerate() {
            print_donation(i, donation);
        }
        println!();
    }
}
