//! Bundled "physics professor" career pipeline.
//!
//! The text is condensed; the branching, gating and odds are the point.
//! Every roll draws from the hook RNG the engine passes in, so a seed
//! reproduces a playthrough exactly.
use rand::{Rng, RngCore};

use crate::graph::{Eligibility, GraphError, Node, NodeGraph, NodeOption};
use crate::traits::{ClassAssignment, StatDelta, TraitStore};
use crate::weighted::{Weighted, select_weighted};

/// Trait keys used by the career graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CareerTrait {
    Income,
    Gender,
    MagnetAccepted,
    HighSchool,
    Publications,
    EliteAccepted,
    StateAccepted,
    University,
    Prestige,
    UndergradConference,
    ConferenceFunded,
    LargeClassResearch,
    MajorOutcome,
    Network,
    GradEliteAccepted,
    GradGoodAccepted,
    GraduateProgram,
}

impl CareerTrait {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Gender => "gender",
            Self::MagnetAccepted => "$magnet_accepted",
            Self::HighSchool => "$selected_high_school",
            Self::Publications => "publications",
            Self::EliteAccepted => "$elite_accepted",
            Self::StateAccepted => "$state_accepted",
            Self::University => "$university",
            Self::Prestige => "prestige",
            Self::UndergradConference => "$attended_undergrad_conference",
            Self::ConferenceFunded => "$conference_funded",
            Self::LargeClassResearch => "$large_class_research",
            Self::MajorOutcome => "$large_class_outcome",
            Self::Network => "network",
            Self::GradEliteAccepted => "$grad_app_elite_acc",
            Self::GradGoodAccepted => "$grad_app_good_acc",
            Self::GraduateProgram => "graduate program",
        }
    }
}

use CareerTrait as T;

const INCOME_ODDS: [Weighted<&str>; 3] = [
    Weighted::new(30.0, "low"),
    Weighted::new(50.0, "medium"),
    Weighted::new(20.0, "high"),
];

const MAGNET_ACCEPTANCE: f64 = 0.4;

fn roll(rng: &mut dyn RngCore) -> f64 {
    rng.r#gen::<f64>()
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn choose(
    key: CareerTrait,
    value: &'static str,
) -> impl Fn(&mut TraitStore, &mut dyn RngCore) -> Option<String> {
    move |traits, _| {
        traits.set_class(key.key(), Some(value));
        None
    }
}

fn continue_to(destination: &str) -> NodeOption {
    NodeOption::new("Continue").to(destination)
}

/// Build the physics professor pipeline.
///
/// # Errors
///
/// Returns an error only if the authored ids collide.
pub fn physics_professor() -> Result<NodeGraph, GraphError> {
    NodeGraph::builder(
        Node::new("welcome", "Welcome")
            .body(
                "Welcome to the game of Physics Professors. Choose the best available path \
                 toward becoming a tenured physics professor. The best path is not always \
                 within reach, and the pipeline from childhood to academia leaks.",
            )
            .option(NodeOption::new("Begin").to("gender")),
    )
    .nodes(childhood())
    .nodes(schooling())
    .nodes(college())
    .nodes(graduate())
    .build()
}

fn childhood() -> Vec<Node> {
    vec![
        Node::new("gender", "Select Your Gender")
            .body(
                "As of 2018 only 19% of physics faculty members are women [1]. The same \
                 disparity holds for bachelor's and doctoral degrees [2].",
            )
            .cite("https://www.aip.org/statistics/reports/women-among-physics-and-astronomy-faculty")
            .cite("https://onlinelibrary.wiley.com/doi/full/10.1002/jnr.24631")
            .option(NodeOption::new("Male").to("income_intro").on_select(choose(T::Gender, "male")))
            .option(
                NodeOption::new("Female")
                    .to("income_intro")
                    .on_select(choose(T::Gender, "female")),
            )
            .option(
                NodeOption::new("Nonbinary")
                    .to("income_intro")
                    .on_select(choose(T::Gender, "nonbinary")),
            ),
        Node::new("income_intro", "Childhood Income Level")
            .body(
                "You cannot decide your family's income. 30% of the US population is low \
                 income, 50% medium income and 20% high income [1].",
            )
            .cite("https://www.investopedia.com/financial-edge/0912/which-income-class-are-you.aspx")
            .option(
                NodeOption::new("Decide My Family's Income")
                    .to("income_assigned")
                    .on_select(|traits, rng| {
                        if let Ok(income) = select_weighted(&INCOME_ODDS, rng) {
                            traits.set_class(T::Income.key(), Some(*income));
                        }
                        None
                    }),
            ),
        Node::new("income_assigned", "Your Income Level")
            .computed_body(|traits| {
                format!(
                    "Your family is {} income. Childhood income shapes the school you attend, \
                     the opportunities after class and the time you have for homework.",
                    traits.get_class(T::Income.key()).unwrap_or("unknown")
                )
            })
            .option(continue_to("school_select")),
    ]
}

fn schooling() -> Vec<Node> {
    vec![
        Node::new("school_select", "Select Your School")
            .body(
                "Private schools and STEM magnet programs offer far more STEM exposure than \
                 underfunded public schools.",
            )
            .on_enter(|traits, rng| {
                let accepted = roll(rng) < MAGNET_ACCEPTANCE;
                traits.add_stat(T::MagnetAccepted.key(), if accepted { 1.0 } else { 0.0 });
            })
            .option(
                NodeOption::new("Private K-12")
                    .to("school_lots_science")
                    .when(|traits| {
                        Eligibility::require(
                            traits.is_class(T::Income.key(), "high"),
                            "You cannot afford to attend a private school.",
                        )
                    })
                    .on_select(choose(T::HighSchool, "private")),
            )
            .option(
                NodeOption::new("STEM Magnet School")
                    .to("school_lots_science")
                    .annotate("You were admitted to the STEM magnet school with an acceptance rate of 40%.")
                    .when(|traits| {
                        Eligibility::require(
                            traits.has_stat(T::MagnetAccepted.key(), 1.0),
                            "You were not accepted to the magnet school, which has an acceptance rate of 40%.",
                        )
                    })
                    .on_select(choose(T::HighSchool, "stem magnet")),
            )
            .option(
                NodeOption::new("Public School")
                    .to("school_low_science")
                    .on_select(choose(T::HighSchool, "local public")),
            ),
        Node::new("school_lots_science", "Strong Science Teaching")
            .logged()
            .computed_body(|traits| {
                format!(
                    "Your {} school had a funded laboratory and blended online learning [1]. \
                     Individual attention from teachers encourages students to pursue STEM [2].",
                    traits.class_display(T::HighSchool.key()).unwrap_or_default()
                )
            })
            .cite("https://eric.ed.gov/?id=EJ1231349")
            .cite("https://www.frontiersin.org/articles/10.3389/feduc.2020.00025/full")
            .option(
                continue_to("college_applications")
                    .may_route(["highschool_pub"])
                    .on_select(|traits, rng| {
                        let magnet = traits.is_class(T::HighSchool.key(), "stem magnet");
                        (magnet || roll(rng) > 0.7).then(|| "highschool_pub".to_string())
                    }),
            ),
        Node::new("highschool_pub", "High School Research")
            .logged()
            .body(
                "Your physics teacher connected you to a local research laboratory [1]. You \
                 were listed as third author on a paper in your junior year.",
            )
            .cite("https://www.forbes.com/sites/kristenmoon/2021/03/29/a-guide-for-pursuing-independent-scientific-research-opportunities-in-high-school/")
            .on_enter(|traits, _| traits.add_stat(T::Publications.key(), 1.0))
            .option(continue_to("college_applications")),
        Node::new("school_low_science", "Weak Science Teaching")
            .logged()
            .computed_body(|traits| {
                format!(
                    "Your {} school was poorly funded. Science was recitation and memorization \
                     taught by an outnumbered teacher [1].",
                    traits.class_display(T::HighSchool.key()).unwrap_or_default()
                )
            })
            .cite("https://www.frontiersin.org/articles/10.3389/feduc.2020.00025/full")
            .option(continue_to("college_applications")),
    ]
}

fn college() -> Vec<Node> {
    vec![
        Node::new("college_applications", "Choosing a College")
            .body(
                "Only around 6% of U.S. students attend an elite university [1]. Teaching may \
                 be similar elsewhere, but the opportunities are not.",
            )
            .on_enter(|traits, rng| {
                let elite = traits.has_stat(T::Publications.key(), 1.0);
                let state = traits.is_class(T::Income.key(), "high")
                    || traits.is_class(T::Income.key(), "medium")
                    || roll(rng) > 0.5;
                traits.set_classes([
                    ClassAssignment::set(T::StateAccepted.key(), yes_no(state)),
                    ClassAssignment::set(T::EliteAccepted.key(), yes_no(elite)),
                ]);
            })
            .option(
                NodeOption::new("Elite Liberal Arts University")
                    .to("elite_uni_welcome")
                    .annotate("You were accepted thanks to your research in high school. Your tuition is covered.")
                    .when(|traits| {
                        if traits.is_class(T::EliteAccepted.key(), "yes") {
                            Eligibility::Eligible
                        } else if traits.is_class(T::HighSchool.key(), "private") {
                            Eligibility::Ineligible(
                                "You were not accepted. Research in high school might have set you apart."
                                    .to_string(),
                            )
                        } else {
                            Eligibility::Ineligible(
                                "You were not accepted. Research in high school might have set you apart, \
                                 but you never had that opportunity."
                                    .to_string(),
                            )
                        }
                    })
                    .on_select(choose(T::University, "elite university")),
            )
            .option(
                NodeOption::new("State University")
                    .to("state_uni_welcome")
                    .when(|traits| {
                        Eligibility::require(
                            traits.is_class(T::StateAccepted.key(), "yes"),
                            "You could not afford to pay the in-state tuition.",
                        )
                    })
                    .on_select(choose(T::University, "state university")),
            )
            .option(
                NodeOption::new("Community College")
                    .to("comm_uni_welcome")
                    .on_select(choose(T::University, "community college")),
            ),
        Node::new("elite_uni_welcome", "Elite Liberal Arts University")
            .logged()
            .body("Congratulations. You are a member of ELAU's most distinguished class yet.")
            .on_enter(|traits, _| traits.set_class(T::Prestige.key(), Some("high")))
            .option(continue_to("class_size_small")),
        Node::new("state_uni_welcome", "State University")
            .logged()
            .body("Congratulations. You join two hundred years of the state's heritage at SU.")
            .on_enter(|traits, _| traits.set_class(T::Prestige.key(), Some("low")))
            .option(continue_to("class_size_large")),
        Node::new("comm_uni_welcome", "Community College")
            .logged()
            .body("Congratulations. At CC we teach you the skills you need to succeed.")
            .on_enter(|traits, _| traits.set_class(T::Prestige.key(), Some("low")))
            .option(continue_to("class_size_nostem")),
        Node::new("class_size_small", "Small Class Size")
            .logged()
            .body(
                "ELAU has a 7:1 student to faculty ratio against a national average of 18:1 [1]. \
                 Your favorite professor invites you to join a solid-state physics lab.",
            )
            .cite("https://collegesofdistinction.com/advice/35-best-student-faculty-college-ratios-for-2022")
            .option(NodeOption::new("Participate in Research").to("undergrad_research")),
        Node::new("class_size_large", "Large Class Size")
            .logged()
            .body(
                "SU has 36,000 undergraduates. You mostly interact with a teaching assistant \
                 and feel less supported as the material gets harder.",
            )
            .on_enter(|traits, rng| {
                if roll(rng) > 0.6 {
                    traits.set_class(T::LargeClassResearch.key(), Some("yes"));
                }
            })
            .option(
                NodeOption::new("Continue")
                    .may_route(["largeclass_undergrad_research_welcome", "undergrad_next_steps"])
                    .on_select(|traits, _| {
                        let research = traits.has_stat(T::Publications.key(), 1.0)
                            || traits.is_class(T::LargeClassResearch.key(), "yes");
                        Some(
                            if research {
                                "largeclass_undergrad_research_welcome"
                            } else {
                                "undergrad_next_steps"
                            }
                            .to_string(),
                        )
                    }),
            ),
        Node::new("largeclass_undergrad_research_welcome", "Research Opportunity")
            .body(
                "Despite SU's class sizes you were accepted into a solid-state physics lab. \
                 Most of your peers never find a research position.",
            )
            .option(NodeOption::new("Research").to("undergrad_research")),
        Node::new("undergrad_next_steps", "Undergraduate Next Steps")
            .body(
                "You are a junior and must decide whether to apply to a PhD program. Most \
                 applicants strengthen their odds with research, which you could not do.",
            )
            .on_enter(|traits, rng| {
                let switch = !traits.is_class(T::Gender.key(), "male") && roll(rng) > 0.5;
                traits.set_class(
                    T::MajorOutcome.key(),
                    Some(if switch { "switch" } else { "continue" }),
                );
            })
            .option(NodeOption::new("Continue").to("grad_application").when(|traits| {
                Eligibility::require(
                    !traits.is_class(T::MajorOutcome.key(), "switch"),
                    "You were one of the only people of your gender in the major and received \
                     little support. You no longer want to pursue physics.",
                )
            }))
            .option(NodeOption::new("Switch Majors").to("transfer_focus")),
        Node::new("class_size_nostem", "Few Good STEM Courses")
            .logged()
            .body(
                "CC focuses on professional degrees. There is little faculty support and no \
                 upper-level STEM courses [1].",
            )
            .cite("https://link.springer.com/article/10.1007/s11162-022-09713-8")
            .option(NodeOption::new("Switch Major").to("transfer_focus")),
        Node::new("transfer_focus", "Transferred Majors")
            .body("You transferred majors. It is too late to become a renowned physicist.")
            .loss(),
    ]
}

fn graduate() -> Vec<Node> {
    vec![
        Node::new("undergrad_research", "Undergraduate Research")
            .logged()
            .body(
                "Only 28% of undergraduates participate in research [1], though physical \
                 sciences report 50% or more [2]. You land on three publications and a \
                 stellar recommendation letter.",
            )
            .cite("https://cra.org/crn/2018/04/understanding-why-most-undergraduate-students-dont-participate-in-research/")
            .cite("https://publish.illinois.edu/phystudentadvisoryboard/physics-graduate-school/getting-undergraduate-research")
            .on_enter(|traits, rng| {
                let conference = roll(rng) > 0.5;
                traits.set_class(T::Prestige.key(), Some("medium"));
                traits.add_stats([
                    StatDelta::new(T::Publications.key(), 3.0),
                    StatDelta::new(T::Network.key(), 10.0),
                    StatDelta::new(T::UndergradConference.key(), if conference { 1.0 } else { 0.0 }),
                ]);
            })
            .option(
                NodeOption::new("Continue")
                    .may_route(["undergrad_conference", "grad_application"])
                    .on_select(|traits, _| {
                        let conference = traits.has_stat(T::UndergradConference.key(), 1.0);
                        Some(
                            if conference {
                                "undergrad_conference"
                            } else {
                                "grad_application"
                            }
                            .to_string(),
                        )
                    }),
            ),
        Node::new("undergrad_conference", "Attended a Conference")
            .logged()
            .body(
                "Your high-impact paper earned an invitation to present at a major conference, \
                 one of the few undergraduates to do so.",
            )
            .on_enter(|traits, rng| {
                traits.set_class(T::Prestige.key(), Some("high"));
                let funded = traits.is_class(T::University.key(), "elite university")
                    || !traits.is_class(T::Income.key(), "low")
                    || roll(rng) > 0.6;
                traits.set_class(T::ConferenceFunded.key(), Some(yes_no(funded)));
            })
            .option(
                NodeOption::new("Attend")
                    .to("grad_application")
                    .when(|traits| {
                        Eligibility::require(
                            traits.is_class(T::ConferenceFunded.key(), "yes"),
                            "You cannot afford the flight and housing, and your university has no funds to cover you.",
                        )
                    })
                    .on_select(|traits, _| {
                        traits.add_stat(T::Network.key(), 200.0);
                        None
                    }),
            )
            .option(NodeOption::new("Skip").to("grad_application")),
        Node::new("grad_application", "Apply to Graduate School")
            .body(
                "A physics PhD takes 6.2 years on average [1]. Graduates earn around $140k a \
                 year [2] but stipends are under $25k [3], while finance pays $200k straight \
                 out of school.",
            )
            .cite("https://www.aip.org/statistics/reports/trends-physics-phds-171819")
            .cite("https://www.erieri.com/salary/job/physicist-phd/united-states")
            .cite("https://physics.ucdavis.edu/graduates/financial-aid")
            .option(
                NodeOption::new("Apply to Graduate School")
                    .to("grad_application_results")
                    .when(|traits| {
                        let low_impact = traits.get_stat(T::Network.key()) <= 10.0
                            && traits.get_stat(T::Publications.key()) < 4.0;
                        Eligibility::require(
                            !low_impact || traits.is_class(T::Income.key(), "high"),
                            "Your family is struggling financially and you cannot justify pursuing \
                             science given your progress so far.",
                        )
                    }),
            )
            .option(NodeOption::new("Work on Wall Street").to("industry")),
        Node::new("grad_application_results", "Choose Your Graduate School")
            .body(
                "Top doctoral programs admit around 10% of applicants and most others under 30%. \
                 Limited funding caps how many undergraduates become doctoral candidates.",
            )
            .on_enter(|traits, rng| {
                let elite = traits.has_stat(T::Network.key(), 50.0)
                    && traits.has_stat(T::Publications.key(), 3.0);
                let good = elite || roll(rng) > 0.5;
                traits.set_classes([
                    ClassAssignment::set(T::GradEliteAccepted.key(), yes_no(elite)),
                    ClassAssignment::set(T::GradGoodAccepted.key(), yes_no(good)),
                ]);
            })
            .option(
                NodeOption::new("Elite Physics Program")
                    .to("grad_school")
                    .annotate("Your publications and network earned you a position at a top program.")
                    .when(|traits| {
                        Eligibility::require(
                            traits.is_class(T::GradEliteAccepted.key(), "yes"),
                            "Your publications and network did not stand out enough to earn you a spot.",
                        )
                    })
                    .on_select(enroll("high", "elite")),
            )
            .option(
                NodeOption::new("Good Physics Program")
                    .to("grad_school")
                    .when(|traits| {
                        Eligibility::require(
                            traits.is_class(T::GradGoodAccepted.key(), "yes"),
                            "You were not admitted in an extremely competitive application season.",
                        )
                    })
                    .on_select(enroll("medium", "good")),
            )
            .option(NodeOption::new("Work in Industry").to("industry2")),
        Node::new("industry", "Work on Wall Street")
            .body("You needed to earn money after graduation and left the academic pipeline.")
            .loss(),
        Node::new("industry2", "Work in Industry")
            .body("Without a graduate program you apply your physics in industry instead.")
            .loss(),
        Node::new("grad_school", "You Got Into a Grad School")
            .body("Congratulations! You are well on your way to becoming a physics professor.")
            .win(),
    ]
}

fn enroll(
    prestige: &'static str,
    program: &'static str,
) -> impl Fn(&mut TraitStore, &mut dyn RngCore) -> Option<String> {
    move |traits, _| {
        traits.set_classes([
            ClassAssignment::unset(T::Income.key()),
            ClassAssignment::set(T::Prestige.key(), prestige),
            ClassAssignment::set(T::GraduateProgram.key(), program),
        ]);
        None
    }
}
