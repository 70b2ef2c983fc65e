//! Episode loop driving an [`Agent`] through an [`Environment`].

use log::{debug, info, warn};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::agent::{Agent, Policy};
use crate::env::Environment;
use crate::error::Result;
use crate::replay_buffer::Transition;
use crate::storage::{self, Checkpoint};

/// Per-episode training statistics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingResults {
    /// Number of steps of each episode
    pub episode_durations: Vec<usize>,
    /// Undiscounted return of each episode
    pub episode_returns: Vec<f32>,
    /// Optimization steps run so far, at the end of each episode
    pub training_epochs: Vec<usize>,
    /// Environment steps simulated so far, at the end of each episode
    pub steps_simulated: Vec<usize>,
    /// Whether the stopping criterion was met
    pub training_completed: bool,
}

/// Options of a training run that are not hyperparameters of the agent.
#[derive(Clone, Debug, Default)]
pub struct TrainerOptions {
    /// Log a progress line after every episode.
    pub verbose: bool,

    /// Checkpoint file, rewritten on every saving boundary.
    pub model_path: Option<PathBuf>,

    /// Training results file, rewritten on every saving boundary.
    pub results_path: Option<PathBuf>,

    /// Stop after this many environment steps in total.
    pub max_total_steps: Option<usize>,

    /// Stop at the next step boundary once this flag is set.
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl TrainerOptions {
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn model_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.model_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn results_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.results_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn max_total_steps(mut self, steps: usize) -> Self {
        self.max_total_steps = Some(steps);
        self
    }

    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }
}

/// Keeps an agent in training mode for as long as it is alive.
struct TrainingGuard<'a, P: Policy> {
    agent: &'a mut Agent<P>,
}

impl<'a, P: Policy> TrainingGuard<'a, P> {
    fn new(agent: &'a mut Agent<P>) -> Self {
        agent.core.set_in_training(true);
        TrainingGuard { agent }
    }
}

impl<P: Policy> Drop for TrainingGuard<'_, P> {
    fn drop(&mut self) {
        self.agent.core.set_in_training(false);
    }
}

impl<P: Policy> Deref for TrainingGuard<'_, P> {
    type Target = Agent<P>;

    fn deref(&self) -> &Agent<P> {
        self.agent
    }
}

impl<P: Policy> DerefMut for TrainingGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut Agent<P> {
        self.agent
    }
}

/// Runs episodes until the agent's stopping criterion is met or
/// `n_episodes_max` episodes have been played.
pub struct Trainer {
    options: TrainerOptions,
}

impl Trainer {
    pub fn new(options: TrainerOptions) -> Self {
        Trainer { options }
    }

    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }

    fn interrupted(&self, step_counter: usize) -> bool {
        let cancelled = self
            .options
            .cancel_flag
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst));
        let exhausted = self.options.max_total_steps.map_or(false, |max| step_counter >= max);
        cancelled || exhausted
    }

    /// Train `agent` on `env`.
    ///
    /// Every `training_stride` environment steps one optimization step is
    /// run. A snapshot of the agent and the results so far are written every
    /// `saving_stride` episodes, when the task is solved, on the final episode
    /// and when the run is interrupted.
    pub fn train<P: Policy, E: Environment>(&self, agent: &mut Agent<P>, env: &mut E) -> Result<TrainingResults> {
        let mut agent = TrainingGuard::new(agent);
        let config = agent.config().clone();

        let mut results = TrainingResults::default();
        let mut checkpoint = Checkpoint::new();
        let mut step_counter = 0;
        let mut epoch_counter = 0;
        let mut interrupted = false;

        for n_episode in 0..config.n_episodes_max {
            let (mut state, _) = env.reset()?;
            let mut episode_return = 0.0;
            let mut solved = false;

            for duration in 1.. {
                if self.interrupted(step_counter) {
                    interrupted = true;
                    break;
                }

                let action = agent.act(state.view())?;
                let step = env.step(action)?;
                step_counter += 1;
                let done = step.is_done();
                episode_return += step.reward;

                agent.add_memory(Transition::new(state, action, step.next_state.clone(), step.reward, done))?;
                state = step.next_state;

                if step_counter % config.training_stride == 0 {
                    agent.run_optimization_step(epoch_counter)?;
                    epoch_counter += 1;
                }

                if done {
                    results.episode_durations.push(duration);
                    results.episode_returns.push(episode_return);
                    results.steps_simulated.push(step_counter);
                    results.training_epochs.push(epoch_counter);

                    let (is_solved, min_return, mean_return) =
                        agent.evaluate_stopping_criterion(&results.episode_returns);
                    solved = is_solved;
                    if self.options.verbose {
                        info!(
                            "episode {:7} | return {:10.3} | min of last {} {:10.3} | mean of last {} {:10.3}",
                            n_episode, episode_return, config.n_solving_episodes, min_return,
                            config.n_solving_episodes, mean_return
                        );
                    }
                    break;
                }
            }

            results.training_completed = solved;
            let last_episode = n_episode + 1 == config.n_episodes_max;
            if n_episode % config.saving_stride == 0 || solved || last_episode || interrupted {
                self.save(&agent, n_episode, &mut checkpoint, &results)?;
            }

            if solved {
                info!("Stopping criterion met after {} episodes", n_episode + 1);
                break;
            }
            if interrupted {
                break;
            }
        }

        if interrupted {
            warn!(
                "Training is stopped after {} environment steps before the stopping criterion has been met",
                step_counter
            );
        } else if !results.training_completed {
            warn!(
                "Training is stopped because the maximum number of episodes, {}, has been reached. \
                 But the stopping criterion has not been met.",
                config.n_episodes_max
            );
        }
        Ok(results)
    }

    fn save<P: Policy>(
        &self,
        agent: &Agent<P>,
        n_episode: usize,
        checkpoint: &mut Checkpoint,
        results: &TrainingResults,
    ) -> Result<()> {
        if let Some(path) = &self.options.model_path {
            checkpoint.insert(n_episode, agent.get_state()?);
            storage::save_checkpoint(path, checkpoint)?;
            debug!("Saved agent state after episode {} to {:?}", n_episode, path);
        }
        if let Some(path) = &self.options.results_path {
            results.save(path)?;
            debug!("Saved training results after episode {} to {:?}", n_episode, path);
        }
        Ok(())
    }
}
