//! Instruction builders for the game program.

use crate::{
    command::Command,
    execution::{AccountMeta, Address, Instruction},
};

/// Address the game program is deployed at.
pub const ID: Address = Address::new(*b"TicTacToeProgram1111111111111111");

fn instruction(program: Address, accounts: Vec<AccountMeta>, command: Command) -> Instruction {
    Instruction {
        program,
        accounts,
        data: command.payload().to_vec(),
    }
}

/// Initialize a freshly allocated dashboard account.
pub fn init_dashboard(program: Address, dashboard: Address) -> Instruction {
    instruction(
        program,
        vec![AccountMeta::signer(dashboard)],
        Command::InitDashboard,
    )
}

/// Initialize a freshly allocated game account with `player` as X.
pub fn init_game(
    program: Address,
    game: Address,
    dashboard: Address,
    player: Address,
) -> Instruction {
    instruction(
        program,
        vec![
            AccountMeta::signer(game),
            AccountMeta::readonly(dashboard),
            AccountMeta::signer(player),
        ],
        Command::InitGame,
    )
}

fn player_instruction(
    program: Address,
    player: Address,
    dashboard: Address,
    game: Address,
    command: Command,
) -> Instruction {
    instruction(
        program,
        vec![
            AccountMeta::signer(player),
            AccountMeta::readonly(dashboard),
            AccountMeta::readonly(game),
        ],
        command,
    )
}

pub fn advertise(
    program: Address,
    player: Address,
    dashboard: Address,
    game: Address,
) -> Instruction {
    player_instruction(program, player, dashboard, game, Command::Advertise)
}

pub fn join(program: Address, player: Address, dashboard: Address, game: Address) -> Instruction {
    player_instruction(program, player, dashboard, game, Command::Join)
}

pub fn keep_alive(
    program: Address,
    player: Address,
    dashboard: Address,
    game: Address,
) -> Instruction {
    player_instruction(program, player, dashboard, game, Command::KeepAlive)
}

pub fn make_move(
    program: Address,
    player: Address,
    dashboard: Address,
    game: Address,
    x: u8,
    y: u8,
) -> Instruction {
    player_instruction(program, player, dashboard, game, Command::Move { x, y })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::COMMAND_LENGTH;

    #[test]
    fn test_account_order() {
        let (player, dashboard, game) = (
            Address::new([1u8; 32]),
            Address::new([2u8; 32]),
            Address::new([3u8; 32]),
        );

        let ix = init_game(ID, game, dashboard, player);
        let order: Vec<_> = ix.accounts.iter().map(|meta| meta.address).collect();
        assert_eq!(order, vec![game, dashboard, player]);
        assert!(ix.accounts[0].signer && !ix.accounts[1].signer && ix.accounts[2].signer);

        let ix = make_move(ID, player, dashboard, game, 1, 2);
        let order: Vec<_> = ix.accounts.iter().map(|meta| meta.address).collect();
        assert_eq!(order, vec![player, dashboard, game]);
        assert_eq!(ix.data, vec![5, 0, 0, 0, 1, 2]);
        assert_eq!(ix.data.len(), COMMAND_LENGTH);
    }
}
