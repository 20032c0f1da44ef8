//! Plan topology: the Plan → Weeks → Days → Tasks aggregate.
//!
//! Every mutation of a plan happens on an in-memory `PlanTopology` that was
//! loaded whole from the store and is committed back whole, guarded by the
//! plan's revision. The methods here keep the aggregate internally consistent:
//! a task attached to a day always has its `task_date` on that day's calendar
//! date, week numbers are unique, and estimates are positive.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::plan::{
    midnight, Day, Plan, Task, TaskContent, TaskStatus, TaskType, Week,
};

/// Theme given to a week synthesized because the plan had none.
pub const DEFAULT_WEEK_THEME: &str = "Adaptive Reinforcement";
/// Theme given to a day synthesized for an insertion.
pub const DEFAULT_DAY_THEME: &str = "Reinforcement Day";
pub const DEFAULT_DAY_HOURS: f64 = 0.5;

#[derive(Debug, Error, PartialEq)]
pub enum TopologyError {
    #[error("requested_week_count must be at least 1, got {0}")]
    InvalidWeekCount(i32),

    #[error("week_number must be at least 1, got {0}")]
    InvalidWeekNumber(i32),

    #[error("week {0} appears more than once in the plan")]
    DuplicateWeek(i32),

    #[error("date {date} appears more than once in week {week_number}")]
    DuplicateDayDate { week_number: i32, date: NaiveDate },

    #[error("day {0} does not belong to this plan")]
    UnknownDay(Uuid),

    #[error("task {0} does not belong to this plan")]
    UnknownTask(Uuid),

    #[error("task date {task_date} is not on day {day_id} ({day_date})")]
    OutsideDay {
        day_id: Uuid,
        day_date: NaiveDate,
        task_date: NaiveDate,
    },

    #[error("estimated_minutes must be positive, got {0}")]
    InvalidEstimate(i32),

    #[error("dependency index {index} is out of range ({len} tasks in draft)")]
    DependencyOutOfRange { index: usize, len: usize },

    #[error("day number {day_number} appears more than once in week {week_number}")]
    DuplicateDayNumber { week_number: i32, day_number: i32 },

    #[error("{days} days from {date} is outside the supported calendar")]
    DateOutOfRange { date: NaiveDate, days: i64 },
}

/// `date` moved by `days`, refusing to run off either end of the calendar.
pub fn shift_date(date: NaiveDate, days: i64) -> Result<NaiveDate, TopologyError> {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or(TopologyError::DateOutOfRange { date, days })
}

/// A plan with its full schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanTopology {
    pub plan: Plan,
    pub weeks: Vec<Week>,
    pub days: Vec<Day>,
    pub tasks: Vec<Task>,
}

impl PlanTopology {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            weeks: Vec::new(),
            days: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn plan_id(&self) -> Uuid {
        self.plan.id
    }

    pub fn day(&self, day_id: Uuid) -> Option<&Day> {
        self.days.iter().find(|d| d.id == day_id)
    }

    pub fn task(&self, task_id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: Uuid) -> Result<&mut Task, TopologyError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(TopologyError::UnknownTask(task_id))
    }

    /// Returns the lowest-numbered week, creating week 1 when the plan has none.
    fn anchor_week_id(&mut self) -> Uuid {
        if let Some(week) = self.weeks.iter().min_by_key(|w| w.week_number) {
            return week.id;
        }
        let week = Week {
            id: Uuid::new_v4(),
            plan_id: self.plan.id,
            week_number: 1,
            theme: DEFAULT_WEEK_THEME.to_string(),
            estimated_hours: 0.0,
        };
        let id = week.id;
        self.weeks.push(week);
        id
    }

    /// Finds the day for `target` inside the plan's first week, creating it if absent.
    ///
    /// Always anchors to the lowest-numbered week, whichever week `target`
    /// chronologically falls in.
    pub fn find_or_create_day(&mut self, target: NaiveDate) -> Uuid {
        let week_id = self.anchor_week_id();

        if let Some(day) = self
            .days
            .iter()
            .find(|d| d.week_id == week_id && d.calendar_date() == target)
        {
            return day.id;
        }

        let day_number = self
            .days
            .iter()
            .filter(|d| d.week_id == week_id)
            .map(|d| d.day_number)
            .max()
            .map_or(1, |n| n + 1);

        let day = Day {
            id: Uuid::new_v4(),
            week_id,
            day_number,
            date: midnight(target),
            theme: DEFAULT_DAY_THEME.to_string(),
            estimated_hours: DEFAULT_DAY_HOURS,
        };
        let id = day.id;
        self.days.push(day);
        id
    }

    /// Any existing day on `date`, preferring the lowest-numbered week.
    pub fn existing_day_on(&self, date: NaiveDate) -> Option<Uuid> {
        self.days
            .iter()
            .filter(|d| d.calendar_date() == date)
            .min_by_key(|d| {
                self.weeks
                    .iter()
                    .find(|w| w.id == d.week_id)
                    .map_or(i32::MAX, |w| w.week_number)
            })
            .map(|d| d.id)
    }

    /// Adds a task after checking it against the day and estimate invariants.
    pub fn insert_task(&mut self, mut task: Task) -> Result<&Task, TopologyError> {
        task.plan_id = self.plan.id;
        self.check_task(&task)?;
        self.tasks.push(task);
        Ok(&self.tasks[self.tasks.len() - 1])
    }

    fn check_task(&self, task: &Task) -> Result<(), TopologyError> {
        if task.estimated_minutes <= 0 {
            return Err(TopologyError::InvalidEstimate(task.estimated_minutes));
        }
        if let Some(day_id) = task.day_id {
            let day = self.day(day_id).ok_or(TopologyError::UnknownDay(day_id))?;
            if day.calendar_date() != task.calendar_date() {
                return Err(TopologyError::OutsideDay {
                    day_id,
                    day_date: day.calendar_date(),
                    task_date: task.calendar_date(),
                });
            }
        }
        Ok(())
    }

    /// Full consistency check over the aggregate.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.plan.requested_week_count < 1 {
            return Err(TopologyError::InvalidWeekCount(
                self.plan.requested_week_count,
            ));
        }
        let mut week_numbers = HashSet::new();
        for week in &self.weeks {
            if week.week_number < 1 {
                return Err(TopologyError::InvalidWeekNumber(week.week_number));
            }
            if !week_numbers.insert(week.week_number) {
                return Err(TopologyError::DuplicateWeek(week.week_number));
            }
        }
        let mut day_slots = HashSet::new();
        for day in &self.days {
            let week = self
                .weeks
                .iter()
                .find(|w| w.id == day.week_id)
                .ok_or(TopologyError::UnknownDay(day.id))?;
            if !day_slots.insert((day.week_id, day.day_number)) {
                return Err(TopologyError::DuplicateDayNumber {
                    week_number: week.week_number,
                    day_number: day.day_number,
                });
            }
        }
        for task in &self.tasks {
            self.check_task(task)?;
        }
        Ok(())
    }

    /// Open tasks on or after `from`, earliest first.
    pub fn upcoming(&self, from: NaiveDate) -> Vec<&Task> {
        self.sorted_tasks(|t| t.calendar_date() >= from && t.status != TaskStatus::Completed)
    }

    /// Tasks before `as_of` that were neither completed nor skipped, earliest first.
    pub fn overdue(&self, as_of: NaiveDate) -> Vec<&Task> {
        self.sorted_tasks(|t| t.calendar_date() < as_of && !t.status.is_closed())
    }

    /// Every task dated on or after `from`, whatever its status.
    pub fn scheduled_from(&self, from: NaiveDate) -> Vec<&Task> {
        self.sorted_tasks(|t| t.calendar_date() >= from)
    }

    pub fn tasks_on(&self, date: NaiveDate) -> Vec<&Task> {
        self.sorted_tasks(|t| t.calendar_date() == date)
    }

    pub fn earliest_task_date(&self) -> Option<NaiveDate> {
        self.tasks.iter().map(|t| t.calendar_date()).min()
    }

    fn sorted_tasks(&self, keep: impl Fn(&Task) -> bool) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().filter(|t| keep(t)).collect();
        tasks.sort_by_key(|t| t.task_date);
        tasks
    }

    /// Builds a consistent topology from plan-generator output.
    pub fn from_draft(
        user_id: Uuid,
        draft: PlanDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, TopologyError> {
        let plan = Plan {
            id: Uuid::new_v4(),
            user_id,
            requested_week_count: draft.requested_week_count,
            hours_per_week: draft.hours_per_week,
            revision: 0,
            adaptation_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let mut topology = PlanTopology::new(plan);

        // Task ids are assigned up front so dependency indices can resolve forward.
        let task_count: usize = draft
            .weeks
            .iter()
            .flat_map(|w| &w.days)
            .map(|d| d.tasks.len())
            .sum();
        let task_ids: Vec<Uuid> = (0..task_count).map(|_| Uuid::new_v4()).collect();
        let mut next_task = 0usize;

        for week_draft in draft.weeks {
            let week = Week {
                id: Uuid::new_v4(),
                plan_id: topology.plan.id,
                week_number: week_draft.week_number,
                theme: week_draft.theme,
                estimated_hours: week_draft.estimated_hours,
            };
            let week_id = week.id;
            topology.weeks.push(week);

            let mut seen_dates = HashSet::new();
            for day_draft in week_draft.days {
                if !seen_dates.insert(day_draft.date) {
                    return Err(TopologyError::DuplicateDayDate {
                        week_number: week_draft.week_number,
                        date: day_draft.date,
                    });
                }
                let day = Day {
                    id: Uuid::new_v4(),
                    week_id,
                    day_number: day_draft.day_number,
                    date: midnight(day_draft.date),
                    theme: day_draft.theme,
                    estimated_hours: day_draft.estimated_hours,
                };
                let day_id = day.id;
                topology.days.push(day);

                for task_draft in day_draft.tasks {
                    let dependencies = task_draft
                        .depends_on
                        .iter()
                        .map(|&index| {
                            task_ids.get(index).copied().ok_or(
                                TopologyError::DependencyOutOfRange {
                                    index,
                                    len: task_count,
                                },
                            )
                        })
                        .collect::<Result<Vec<_>, _>>()?;

                    let task = Task {
                        id: task_ids[next_task],
                        plan_id: topology.plan.id,
                        day_id: Some(day_id),
                        task_date: midnight(day_draft.date),
                        task_type: task_draft.task_type,
                        status: TaskStatus::Pending,
                        title: task_draft.title,
                        description: task_draft.description,
                        skill_names: dedup_preserving_order(task_draft.skill_names),
                        estimated_minutes: task_draft.estimated_minutes,
                        actual_minutes: None,
                        completed_at: None,
                        dependencies,
                        content: task_draft.content,
                        created_at: now,
                    };
                    next_task += 1;
                    topology.insert_task(task)?;
                }
            }
        }

        topology.validate()?;
        Ok(topology)
    }
}

fn dedup_preserving_order(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Plan-generator draft (input shape)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PlanDraft {
    pub requested_week_count: i32,
    pub hours_per_week: f64,
    #[serde(default)]
    pub weeks: Vec<WeekDraft>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeekDraft {
    pub week_number: i32,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub estimated_hours: f64,
    #[serde(default)]
    pub days: Vec<DayDraft>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DayDraft {
    pub day_number: i32,
    pub date: NaiveDate,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub estimated_hours: f64,
    #[serde(default)]
    pub tasks: Vec<TaskDraft>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskDraft {
    pub task_type: TaskType,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skill_names: Vec<String>,
    pub estimated_minutes: i32,
    /// Indices into the draft's tasks, counted across all weeks and days in order.
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default)]
    pub content: TaskContent,
}
