use crate::roster::Participant;

use super::types::{Block, Member};

/// Builds one block per participant: the participant first, then each guest
/// tagged with their host.
pub fn build_blocks<'a, I>(participants: I) -> Vec<Block>
where
    I: IntoIterator<Item = &'a Participant>,
{
    participants
        .into_iter()
        .map(|p| {
            let mut members = Vec::with_capacity(p.block_size());
            members.push(Member::player(&p.name));
            members.extend(
                p.guest_labels()
                    .into_iter()
                    .map(|label| Member::guest(label, &p.name)),
            );
            Block {
                host: p.name.clone(),
                members,
                preference: p.preference,
            }
        })
        .collect()
}
