use chrono::{DateTime, Utc};
use log::debug;

use crate::{
    app::{ArcRatingRepository, ServiceResult},
    persistence::games::GameId,
    player::AccountId,
};

pub const INITIAL_RATING: f64 = 1000.0;
pub const K_FACTOR: f64 = 32.0;

/// Per-account, per-game rating state. Guests never have one.
#[derive(Clone, Debug)]
pub struct RatingRecord {
    pub account_id: AccountId,
    pub game_id: GameId,
    pub rating: f64,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub win_streak: u32,
    pub best_win_streak: u32,
    pub updated_at: DateTime<Utc>,
}

impl RatingRecord {
    pub fn fresh(account_id: AccountId, game_id: GameId) -> Self {
        RatingRecord {
            account_id,
            game_id,
            rating: INITIAL_RATING,
            games_played: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            win_streak: 0,
            best_win_streak: 0,
            updated_at: Utc::now(),
        }
    }
}

pub fn expected_score(own: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - own) / 400.0))
}

/// Applies a decisive result to both records. The rating exchange is
/// zero-sum by construction.
pub fn apply_win(winner: &mut RatingRecord, loser: &mut RatingRecord) {
    let winner_expected = expected_score(winner.rating, loser.rating);
    let loser_expected = 1.0 - winner_expected;
    winner.rating += K_FACTOR * (1.0 - winner_expected);
    loser.rating += K_FACTOR * (0.0 - loser_expected);
    winner.wins += 1;
    winner.win_streak += 1;
    winner.best_win_streak = winner.best_win_streak.max(winner.win_streak);
    loser.losses += 1;
    loser.win_streak = 0;
    finish_game(winner);
    finish_game(loser);
}

/// A draw counts as half a win for both sides and breaks both streaks.
pub fn apply_draw(a: &mut RatingRecord, b: &mut RatingRecord) {
    let a_expected = expected_score(a.rating, b.rating);
    let b_expected = 1.0 - a_expected;
    a.rating += K_FACTOR * (0.5 - a_expected);
    b.rating += K_FACTOR * (0.5 - b_expected);
    a.draws += 1;
    b.draws += 1;
    a.win_streak = 0;
    b.win_streak = 0;
    finish_game(a);
    finish_game(b);
}

fn finish_game(record: &mut RatingRecord) {
    record.games_played += 1;
    record.updated_at = Utc::now();
}

#[derive(Clone, Debug)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub display_name: String,
    pub record: RatingRecord,
}

pub trait RatingService {
    fn apply_match_result(
        &self,
        game_id: GameId,
        winner: AccountId,
        loser: AccountId,
    ) -> ServiceResult<()>;
    fn apply_match_draw(&self, game_id: GameId, a: AccountId, b: AccountId) -> ServiceResult<()>;
    /// Current rating, or the initial rating if the account has not played
    /// this game ranked yet.
    fn get_rating(&self, account_id: AccountId, game_id: GameId) -> ServiceResult<f64>;
    fn get_stats(
        &self,
        account_id: AccountId,
        game_id: GameId,
    ) -> ServiceResult<(RatingRecord, u32)>;
    fn get_leaderboard(&self, game_id: GameId, limit: u32) -> ServiceResult<Vec<LeaderboardEntry>>;
}

pub struct RatingServiceImpl {
    rating_repository: ArcRatingRepository,
}

impl RatingServiceImpl {
    pub fn new(rating_repository: ArcRatingRepository) -> Self {
        Self { rating_repository }
    }

    fn load_or_fresh(
        &self,
        account_id: AccountId,
        game_id: GameId,
    ) -> ServiceResult<RatingRecord> {
        Ok(self
            .rating_repository
            .get_rating(account_id, game_id)?
            .unwrap_or_else(|| RatingRecord::fresh(account_id, game_id)))
    }
}

impl RatingService for RatingServiceImpl {
    fn apply_match_result(
        &self,
        game_id: GameId,
        winner: AccountId,
        loser: AccountId,
    ) -> ServiceResult<()> {
        let mut winner_record = self.load_or_fresh(winner, game_id)?;
        let mut loser_record = self.load_or_fresh(loser, game_id)?;
        apply_win(&mut winner_record, &mut loser_record);
        self.rating_repository.upsert_rating(&winner_record)?;
        self.rating_repository.upsert_rating(&loser_record)?;
        debug!(
            "Ratings for game {} updated: account {} -> {:.1}, account {} -> {:.1}",
            game_id,
            winner,
            winner_record.rating,
            loser,
            loser_record.rating
        );
        Ok(())
    }

    fn apply_match_draw(&self, game_id: GameId, a: AccountId, b: AccountId) -> ServiceResult<()> {
        let mut a_record = self.load_or_fresh(a, game_id)?;
        let mut b_record = self.load_or_fresh(b, game_id)?;
        apply_draw(&mut a_record, &mut b_record);
        self.rating_repository.upsert_rating(&a_record)?;
        self.rating_repository.upsert_rating(&b_record)?;
        debug!(
            "Ratings for game {} updated after draw: account {} -> {:.1}, account {} -> {:.1}",
            game_id,
            a,
            a_record.rating,
            b,
            b_record.rating
        );
        Ok(())
    }

    fn get_rating(&self, account_id: AccountId, game_id: GameId) -> ServiceResult<f64> {
        Ok(self.load_or_fresh(account_id, game_id)?.rating)
    }

    fn get_stats(
        &self,
        account_id: AccountId,
        game_id: GameId,
    ) -> ServiceResult<(RatingRecord, u32)> {
        let record = self.load_or_fresh(account_id, game_id)?;
        let rank = self.rating_repository.get_rank(&record)?;
        Ok((record, rank))
    }

    fn get_leaderboard(&self, game_id: GameId, limit: u32) -> ServiceResult<Vec<LeaderboardEntry>> {
        let rows = self.rating_repository.get_leaderboard(game_id, limit)?;
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, (display_name, record))| LeaderboardEntry {
                rank: i as u32 + 1,
                display_name,
                record,
            })
            .collect())
    }
}
