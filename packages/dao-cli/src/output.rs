//! Terminal and JSON rendering.

use anyhow::Result;
use colored::Colorize;
use dao_core::{ConnectionState, DaoEvent, MemberRecord, MemberSnapshot, MembershipStatus, VoteStatus};
use ledger_client::{Deployment, Proposal};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_status(snapshot: &MemberSnapshot) {
    let connection = match &snapshot.connection {
        ConnectionState::Disconnected => "disconnected".dimmed().to_string(),
        ConnectionState::Connected { identity } => identity.to_string().bright_cyan().to_string(),
        ConnectionState::WrongNetwork { expected, actual } => {
            format!("wrong network ({actual}, expected {expected})")
                .bright_red()
                .to_string()
        }
    };
    println!("{:<12} {}", "Wallet:".bold(), connection);
    println!("{:<12} {}", "Membership:".bold(), membership_label(snapshot.membership));

    if let Some(balance) = snapshot.own_balance {
        println!("{:<12} {} tokens", "Balance:".bold(), balance);
    }
    if snapshot.membership == MembershipStatus::Claimed {
        println!("{:<12} {}", "Members:".bold(), snapshot.roster.len());
        let open = snapshot.votes.iter().filter(|v| !v.has_voted).count();
        println!(
            "{:<12} {} ({} awaiting your vote)",
            "Proposals:".bold(),
            snapshot.proposals.len(),
            open
        );
    }
    if let Some(error) = &snapshot.last_error {
        println!("{:<12} {}", "Last error:".bold(), error.bright_red());
    }
}

pub fn print_members(roster: &[MemberRecord]) {
    if roster.is_empty() {
        println!("{}", "No members yet.".dimmed());
        return;
    }
    println!("{:<44} {:>24}", "Address".bold(), "Token Amount".bold());
    for member in roster {
        println!("{:<44} {:>24}", member.address.as_str(), member.token_balance.to_string());
    }
}

pub fn print_proposals(proposals: &[Proposal], votes: &[VoteStatus]) {
    if proposals.is_empty() {
        println!("{}", "No proposals yet.".dimmed());
        return;
    }
    for proposal in proposals {
        let voted = votes
            .iter()
            .find(|v| v.proposal_id == proposal.id)
            .map(|v| v.has_voted)
            .unwrap_or(false);
        let marker = if voted {
            "voted".bright_green()
        } else {
            "open".bright_yellow()
        };
        println!("{} [{}] {}", proposal.id.as_str().bold(), marker, proposal.description);
        for choice in &proposal.choices {
            println!("    {:<10} {}", choice.label, proposal.votes_for(&choice.label));
        }
    }
}

pub fn print_deployment(kind: &str, deployment: &Deployment) {
    println!("{} {} at {}", "✓".bright_green(), kind, deployment.address.bright_cyan());
    if !deployment.metadata.is_null() {
        println!("{}", deployment.metadata);
    }
}

#[derive(Serialize)]
struct EventLine<'a> {
    event: &'a str,
    detail: String,
}

pub fn print_event(event: &DaoEvent, json: bool) -> Result<()> {
    let (kind, detail) = describe(event);
    if json {
        println!("{}", serde_json::to_string(&EventLine { event: kind, detail })?);
    } else {
        println!("{} {}", format!("[{kind}]").bright_blue(), detail);
    }
    Ok(())
}

fn describe(event: &DaoEvent) -> (&'static str, String) {
    match event {
        DaoEvent::ConnectionChanged(state) => ("connection", format!("{state:?}")),
        DaoEvent::MembershipChanged { identity, status } => {
            ("membership", format!("{identity} is {status:?}"))
        }
        DaoEvent::RosterUpdated { members } => ("roster", format!("{members} members")),
        DaoEvent::ProposalsUpdated { proposals } => ("proposals", format!("{proposals} proposals")),
        DaoEvent::VoteStatusChanged {
            identity,
            proposal_id,
            state,
        } => ("vote", format!("{identity} on {proposal_id}: {state:?}")),
        DaoEvent::BalanceUpdated { identity, balance } => {
            ("balance", format!("{identity} holds {balance} tokens"))
        }
        DaoEvent::OperationFailed(err) => ("error", err.to_string()),
    }
}

fn membership_label(status: MembershipStatus) -> String {
    match status {
        MembershipStatus::Claimed => "member".bright_green().to_string(),
        MembershipStatus::Claiming => "claim in progress".bright_yellow().to_string(),
        MembershipStatus::ClaimFailed => "claim failed".bright_red().to_string(),
        MembershipStatus::NotClaimed => "not a member (run `dao claim`)".normal().to_string(),
        MembershipStatus::Unknown => "unknown".dimmed().to_string(),
    }
}
